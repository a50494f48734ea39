//! Shared fixtures for unit tests

use std::cell::RefCell;
use std::sync::Arc;

use crate::bfv::{BfvContext, BfvEvaluator, Ciphertext, EvaluationKeys, SecretKey};
use crate::math::GaussianSampler;
use crate::params::BfvParams;
use crate::scheme::SchemeAdapter;

/// Evaluator plus the secret key behind it, on the insecure test parameters
pub(crate) struct Fixture {
    pub eval: BfvEvaluator,
    pub sk: SecretKey,
    pub sampler: RefCell<GaussianSampler>,
}

impl Fixture {
    pub fn new(galois_elements: &[usize]) -> Self {
        Self::with_params(BfvParams::insecure_test(), galois_elements)
    }

    pub fn with_params(params: BfvParams, galois_elements: &[usize]) -> Self {
        let ctx = Arc::new(BfvContext::new(params).unwrap());
        let mut sampler = GaussianSampler::with_seed(ctx.params().sigma, 0x5eed);
        let sk = SecretKey::generate(&ctx, &mut sampler);
        let keys = EvaluationKeys::generate(&ctx, &sk, galois_elements, &mut sampler).unwrap();
        Self {
            eval: BfvEvaluator::new(ctx, keys),
            sk,
            sampler: RefCell::new(sampler),
        }
    }

    /// Encrypt `values`, zero-padded to N coefficients
    pub fn encrypt(&self, values: &[u64]) -> Ciphertext {
        let padded = self.padded(values);
        self.sk
            .encrypt(self.eval.context(), &padded, &mut self.sampler.borrow_mut())
    }

    pub fn decrypt(&self, ct: &Ciphertext) -> Vec<u64> {
        self.sk.decrypt(self.eval.context(), ct)
    }

    pub fn noise_budget(&self, ct: &Ciphertext) -> u32 {
        self.sk.noise_budget(self.eval.context(), ct)
    }

    /// `values` zero-padded to N coefficients
    pub fn padded(&self, values: &[u64]) -> Vec<u64> {
        let mut v = values.to_vec();
        v.resize(self.eval.ring_degree(), 0);
        v
    }
}
