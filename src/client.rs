//! Client side of the protocols for the BFV backend
//!
//! Holds the secret key, produces the evaluation keys the server needs, builds
//! queries and decodes replies.
//!
//! # Example
//!
//! ```
//! use hepir::client::Client;
//! use hepir::engine::{respond_retrieval, Database, ProtocolParams};
//! use hepir::params::BfvParams;
//! use hepir::scheme::SchemeAdapter;
//!
//! let protocol = ProtocolParams::retrieval(vec![4]);
//! let mut client = Client::for_retrieval(BfvParams::insecure_test(), &protocol.dimensions, Some(7)).unwrap();
//! let server = client.server_evaluator();
//!
//! let db = Database::new((0..4).map(|i| server.plaintext_from_coeffs(vec![10 + i])).collect());
//! let queries = client.retrieval_query(&protocol.dimensions, &[2], protocol.reduce.expansion).unwrap();
//! let reply = respond_retrieval(&server, &protocol, &db, queries).unwrap();
//! let entry = client.decode_retrieval(reply, &protocol.dimensions, &protocol.reduce).unwrap();
//! assert_eq!(entry[0], 12);
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::bfv::{BfvContext, BfvEvaluator, Ciphertext, EvaluationKeys, Plaintext, SecretKey};
use crate::engine::expand::expansion_scale_inverse;
use crate::engine::{
    expansion_depth, expansion_galois_elements, DimensionReducer, DimensionVector,
    ExpansionVariant, FoldMode, LevelManager, ReduceConfig,
};
use crate::error::{config_err, Result};
use crate::math::modular::pow_mod;
use crate::math::GaussianSampler;
use crate::params::BfvParams;
use crate::scheme::SchemeAdapter;

/// Secret-key holder
pub struct Client {
    evaluator: BfvEvaluator,
    sk: SecretKey,
    sampler: GaussianSampler,
}

impl Client {
    /// Generate fresh keys. `seed` makes key generation and encryption
    /// deterministic.
    ///
    /// # Errors
    ///
    /// Invalid parameters or Galois elements.
    pub fn new(params: BfvParams, galois_elements: &[usize], seed: Option<u64>) -> Result<Self> {
        let ctx = Arc::new(BfvContext::new(params)?);
        let sigma = ctx.params().sigma;
        let mut sampler = match seed {
            Some(seed) => GaussianSampler::with_seed(sigma, seed),
            None => GaussianSampler::new(sigma),
        };
        let sk = SecretKey::generate(&ctx, &mut sampler);
        let keys = EvaluationKeys::generate(&ctx, &sk, galois_elements, &mut sampler)?;
        debug!(
            ring_dim = ctx.ring_dim(),
            galois_keys = galois_elements.len(),
            "generated client keys"
        );
        Ok(Self {
            evaluator: BfvEvaluator::new(ctx, keys),
            sk,
            sampler,
        })
    }

    /// Keys with every Galois element the expansion of `dimensions` needs
    pub fn for_retrieval(params: BfvParams, dimensions: &[usize], seed: Option<u64>) -> Result<Self> {
        let mut elements: Vec<usize> = dimensions
            .iter()
            .flat_map(|&n| expansion_galois_elements(params.ring_dim, n))
            .collect();
        elements.sort_unstable();
        elements.dedup();
        Self::new(params, &elements, seed)
    }

    pub fn context(&self) -> &BfvContext {
        self.evaluator.context()
    }

    /// Keys to hand to the server
    pub fn evaluation_keys(&self) -> &EvaluationKeys {
        self.evaluator.keys()
    }

    /// Evaluator the server would build from [`Client::evaluation_keys`]
    pub fn server_evaluator(&self) -> BfvEvaluator {
        self.evaluator.clone()
    }

    /// Symmetric encryption of `values`, zero-padded to N coefficients
    pub fn encrypt(&mut self, values: &[u64]) -> Result<Ciphertext> {
        let n = self.evaluator.ring_degree();
        if values.len() > n {
            return Err(config_err!(
                "{} values do not fit a ring of degree {}",
                values.len(),
                n
            ));
        }
        let t = self.evaluator.plain_modulus();
        let mut coeffs: Vec<u64> = values.iter().map(|v| v % t).collect();
        coeffs.resize(n, 0);
        Ok(self
            .sk
            .encrypt(self.evaluator.context(), &coeffs, &mut self.sampler))
    }

    pub fn decrypt(&self, ct: &Ciphertext) -> Vec<u64> {
        self.sk.decrypt(self.evaluator.context(), ct)
    }

    /// Remaining invariant noise budget in bits
    pub fn noise_budget(&self, ct: &Ciphertext) -> u32 {
        self.sk.noise_budget(self.evaluator.context(), ct)
    }

    /// One compact query per dimension selecting the multi-index `index`.
    ///
    /// The selected coefficient carries `2^{-ceil(log2 n_i)} mod t` for the
    /// direct variant and 1 for the normalized one.
    pub fn retrieval_query(
        &mut self,
        dimensions: &[usize],
        index: &[usize],
        variant: ExpansionVariant,
    ) -> Result<Vec<Ciphertext>> {
        let dims = DimensionVector::new(dimensions.to_vec())?;
        dims.flat_index(index)?;
        let t = self.evaluator.plain_modulus();
        let n = self.evaluator.ring_degree();
        dims.sizes()
            .iter()
            .zip(index)
            .map(|(&size, &i)| {
                if size > n {
                    return Err(config_err!(
                        "dimension of size {} exceeds the ring degree {}",
                        size,
                        n
                    ));
                }
                let value = match variant {
                    ExpansionVariant::Direct => expansion_scale_inverse(t, expansion_depth(size))
                        .ok_or_else(|| config_err!("plaintext modulus {} has no inverse of 2", t))?,
                    ExpansionVariant::Normalized => 1,
                };
                let mut coeffs = vec![0u64; i + 1];
                coeffs[i] = value;
                self.encrypt(&coeffs)
            })
            .collect()
    }

    /// [`Client::retrieval_query`] for a flat database position
    pub fn retrieval_query_flat(
        &mut self,
        dimensions: &[usize],
        flat: usize,
        variant: ExpansionVariant,
    ) -> Result<Vec<Ciphertext>> {
        let dims = DimensionVector::new(dimensions.to_vec())?;
        let index = dims.multi_index(flat)?;
        self.retrieval_query(dimensions, &index, variant)
    }

    /// Encryptions of the constants `x^p mod t` for each source power `p`
    pub fn matching_query(&mut self, x: u64, source_powers: &[usize]) -> Result<Vec<(usize, Ciphertext)>> {
        let t = self.evaluator.plain_modulus();
        source_powers
            .iter()
            .map(|&p| Ok((p, self.encrypt(&[pow_mod(x % t, p as u64, t)])?)))
            .collect()
    }

    /// Recover the selected entry from a retrieval reply.
    ///
    /// In decompose mode the reply holds `R^{d-1}` ciphertexts; every group of
    /// `R` consecutive decryptions recomposes one ciphertext of the previous
    /// stage, until a single ciphertext remains.
    pub fn decode_retrieval(
        &self,
        reply: Vec<Ciphertext>,
        dimensions: &[usize],
        config: &ReduceConfig,
    ) -> Result<Vec<u64>> {
        let dims = DimensionVector::new(dimensions.to_vec())?;
        let levels = LevelManager::new(&self.evaluator);
        let reducer = DimensionReducer::new(levels, *config);
        let expected = reducer.reply_len(&dims);
        if reply.len() != expected {
            return Err(config_err!(
                "expected a reply of {} ciphertexts, got {}",
                expected,
                reply.len()
            ));
        }

        let mut cts = reply;
        if config.fold_mode == FoldMode::Decompose {
            let width = reducer.decomposition_width();
            let level = reducer.decompose_level();
            while cts.len() > 1 {
                cts = cts
                    .chunks(width)
                    .map(|chunk| {
                        let digits: Vec<Plaintext> = chunk
                            .iter()
                            .map(|ct| self.evaluator.plaintext_from_coeffs(self.decrypt(ct)))
                            .collect();
                        levels.compose(&digits, 2, level)
                    })
                    .collect::<Result<Vec<_>>>()?;
            }
        }
        let ct = cts
            .first()
            .ok_or_else(|| config_err!("empty retrieval reply"))?;
        Ok(self.decrypt(ct))
    }

    /// Per-coefficient values of `P(x)` from a matching reply
    pub fn decode_matching(&self, reply: &Ciphertext) -> Vec<u64> {
        self.decrypt(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{respond_matching, respond_retrieval, Database, ProtocolParams};

    #[test]
    fn test_retrieval_roundtrip_normalized() {
        let dims = vec![3, 3];
        let mut client = Client::for_retrieval(BfvParams::insecure_test(), &dims, Some(1)).unwrap();
        let server = client.server_evaluator();
        let mut protocol = ProtocolParams::retrieval(dims.clone());
        protocol.reduce.expansion = ExpansionVariant::Normalized;

        let db = Database::new(
            (0..9u64)
                .map(|i| server.plaintext_from_coeffs(vec![i, 50 + i]))
                .collect(),
        );
        let queries = client
            .retrieval_query_flat(&dims, 7, ExpansionVariant::Normalized)
            .unwrap();
        let reply = respond_retrieval(&server, &protocol, &db, queries).unwrap();
        let entry = client.decode_retrieval(reply, &dims, &protocol.reduce).unwrap();
        assert_eq!(&entry[..2], &[7, 57]);
    }

    #[test]
    fn test_query_validation() {
        let mut client = Client::new(BfvParams::insecure_test(), &[], Some(2)).unwrap();
        assert!(client
            .retrieval_query(&[4, 4], &[4, 0], ExpansionVariant::Direct)
            .is_err());
        assert!(client
            .retrieval_query(&[4], &[1, 1], ExpansionVariant::Direct)
            .is_err());
        assert!(client.encrypt(&[0; 65]).is_err());
    }

    #[test]
    fn test_decode_rejects_wrong_reply_len() {
        let mut client = Client::new(BfvParams::insecure_test(), &[], Some(3)).unwrap();
        let ct = client.encrypt(&[1]).unwrap();
        assert!(client
            .decode_retrieval(vec![ct], &[2, 2], &ReduceConfig::default())
            .is_err());
    }

    #[test]
    fn test_matching_roundtrip() {
        let mut client = Client::new(BfvParams::insecure_test(), &[], Some(4)).unwrap();
        let server = client.server_evaluator();
        let protocol = ProtocolParams::matching(3, vec![1, 2], 0).unwrap();
        // P(x) = 1 + 2x + 3x^2 + 4x^3
        let coeffs: Vec<Plaintext> = (1..=4u64)
            .map(|c| server.plaintext_from_coeffs(vec![c]))
            .collect();
        let sources = client.matching_query(5, &protocol.source_powers).unwrap();
        let reply = respond_matching(&server, &protocol, &coeffs, sources).unwrap();
        assert_eq!(client.decode_matching(&reply)[0], (1 + 10 + 75 + 500) % 257);
    }
}
