//! Mathematical primitives for the BFV backend.
//!
//! - **Modular arithmetic** on 64-bit words
//! - **NTT-friendly prime search**
//! - **Number-Theoretic Transform** over an RNS chain, Montgomery form
//! - **RNS polynomials** over R_Q = Z_Q[X]/(X^n + 1)
//! - **CRT composition** through `num-bigint` for exact rounding steps
//! - **Sampling** of Gaussian, ternary and uniform polynomials
//!
//! # Example
//!
//! ```
//! use hepir::math::{primes, NttContext, Poly};
//!
//! let moduli = primes::ntt_primes(60, 64, 2, &[]).unwrap();
//! let ctx = NttContext::with_moduli(64, &moduli);
//! let mut p = Poly::from_signed(&[1; 64], &moduli);
//! p.to_ntt(&ctx);
//! assert!(p.is_ntt());
//! ```

pub mod modular;
pub mod ntt;
pub mod poly;
pub mod primes;
pub mod rns;
pub mod sampler;

pub use ntt::NttContext;
pub use poly::Poly;
pub use rns::RnsBase;
pub use sampler::GaussianSampler;
