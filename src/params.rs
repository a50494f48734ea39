//! Parameter sets for the BFV backend
//!
//! The presets here are sized for functional testing and benchmarking of the
//! retrieval engine, not chosen for a security level. Selecting secure
//! parameters is left to the deployment.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::math::modular::bit_length;
use crate::math::primes::{is_prime, ntt_primes};
use crate::math::sampler::DEFAULT_SIGMA;

/// Leveled BFV parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BfvParams {
    /// Ring dimension N (power of two)
    pub ring_dim: usize,

    /// Plaintext modulus t
    pub plain_modulus: u64,

    /// Ciphertext modulus chain q_0, ..., q_k.
    /// Each must be an NTT-friendly prime: q ≡ 1 (mod 2N).
    /// Modulus switching drops primes from the end.
    pub moduli: Vec<u64>,

    /// Standard deviation for Gaussian error sampling
    pub sigma: f64,

    /// Digit width w of the key-switching decomposition (base 2^w)
    pub ks_base_bits: u32,
}

impl BfvParams {
    /// Small ring with a deep chain, for tests.
    ///
    /// N = 64, t = 257, four 60-bit primes. Insecure.
    pub fn insecure_test() -> Self {
        Self {
            ring_dim: 64,
            plain_modulus: 257,
            moduli: vec![
                1152921504606844417,
                1152921504606844289,
                1152921504606842753,
                1152921504606837377,
            ],
            sigma: DEFAULT_SIGMA,
            ks_base_bits: 20,
        }
    }

    /// N = 4096 with a 109-bit chain (36 + 36 + 37 bits) and t = 65537
    pub fn pir_n4096() -> Self {
        Self {
            ring_dim: 4096,
            plain_modulus: 65537,
            moduli: vec![68719403009, 68719230977, 137438822401],
            sigma: DEFAULT_SIGMA,
            ks_base_bits: 12,
        }
    }

    /// Build parameters by searching NTT-friendly primes of the given bit sizes.
    ///
    /// Primes of equal size are taken from the largest downwards, so a chain
    /// like `[60, 60, 60]` yields three distinct primes.
    pub fn from_bit_sizes(ring_dim: usize, plain_modulus: u64, moduli_bits: &[u32]) -> Result<Self> {
        if !ring_dim.is_power_of_two() {
            return Err(Error::InvalidParameters("ring_dim must be a power of two"));
        }
        let mut moduli: Vec<u64> = Vec::with_capacity(moduli_bits.len());
        for &bits in moduli_bits {
            let prime = ntt_primes(bits, ring_dim, 1, &moduli)
                .and_then(|found| found.first().copied())
                .ok_or(Error::InvalidParameters(
                    "no NTT-friendly prime of the requested size",
                ))?;
            moduli.push(prime);
        }

        let params = Self {
            ring_dim,
            plain_modulus,
            moduli,
            sigma: DEFAULT_SIGMA,
            ks_base_bits: 20,
        };
        params.validate().map_err(Error::InvalidParameters)?;
        Ok(params)
    }

    /// Index of the deepest level (all moduli active)
    pub fn top_level(&self) -> usize {
        self.moduli.len() - 1
    }

    /// Bits of plaintext carried per decomposition digit: floor(log2 t)
    pub fn plain_bits(&self) -> u32 {
        bit_length(self.plain_modulus) - 1
    }

    /// Check if parameters are valid
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if !self.ring_dim.is_power_of_two() || self.ring_dim < 4 {
            return Err("ring_dim must be a power of two and at least 4");
        }
        if self.plain_modulus < 2 {
            return Err("plain_modulus must be at least 2");
        }
        if self.moduli.is_empty() {
            return Err("modulus chain must be non-empty");
        }
        let two_n = 2 * self.ring_dim as u64;
        for (i, &q) in self.moduli.iter().enumerate() {
            if q % two_n != 1 {
                return Err("each modulus must be ≡ 1 (mod 2N) for NTT");
            }
            if bit_length(q) > 61 {
                return Err("moduli must be at most 61 bits");
            }
            if !is_prime(q) {
                return Err("moduli must be prime");
            }
            if self.moduli[..i].contains(&q) {
                return Err("moduli must be distinct");
            }
            if q <= self.plain_modulus {
                return Err("every modulus must exceed plain_modulus");
            }
        }
        if !(1..=30).contains(&self.ks_base_bits) {
            return Err("ks_base_bits must be in 1..=30");
        }
        if self.sigma <= 0.0 {
            return Err("sigma must be positive");
        }
        Ok(())
    }
}

impl Default for BfvParams {
    fn default() -> Self {
        Self::insecure_test()
    }
}
