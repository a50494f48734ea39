//! Leveled RNS-BFV backend
//!
//! A compact implementation of the BFV scheme over an RNS modulus chain,
//! providing everything the retrieval engine needs through
//! [`crate::scheme::SchemeAdapter`]:
//!
//! - Ternary secret, public, relinearization and Galois keys
//! - Symmetric and public-key encryption, decryption, noise budget
//! - Tensor multiplication with exact rounding through an auxiliary base
//! - Modulus switching along the chain, NTT transforms
//! - Galois automorphisms with RNS-digit key switching
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use hepir::bfv::{BfvContext, BfvEvaluator, EvaluationKeys, SecretKey};
//! use hepir::math::GaussianSampler;
//! use hepir::params::BfvParams;
//! use hepir::scheme::SchemeAdapter;
//!
//! let ctx = Arc::new(BfvContext::new(BfvParams::insecure_test()).unwrap());
//! let mut sampler = GaussianSampler::with_seed(ctx.params().sigma, 1);
//! let sk = SecretKey::generate(&ctx, &mut sampler);
//! let keys = EvaluationKeys::generate(&ctx, &sk, &[], &mut sampler).unwrap();
//! let eval = BfvEvaluator::new(ctx.clone(), keys);
//!
//! let mut msg = vec![0u64; ctx.ring_dim()];
//! msg[0] = 12;
//! let ct = sk.encrypt(&ctx, &msg, &mut sampler);
//! let sq = eval.relinearize(eval.square(&ct));
//! assert_eq!(sk.decrypt(&ctx, &sq)[0], 144);
//! ```

mod context;
mod encrypt;
mod evaluator;
pub mod galois;
mod keys;
mod keyswitch;
mod tensor;
mod types;

pub use context::BfvContext;
pub use evaluator::BfvEvaluator;
pub use keys::{EvaluationKeys, GaloisKeys, KeySwitchKey, PublicKey, RelinKey, SecretKey};
pub use keyswitch::key_switch;
pub use types::{Ciphertext, Plaintext};
