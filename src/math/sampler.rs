//! Randomness for key generation and encryption
//!
//! Every sampler draws from a `ChaCha20Rng`, seeded either from the OS or
//! from a caller-provided seed for reproducible tests.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Default Gaussian standard deviation
pub const DEFAULT_SIGMA: f64 = 3.2;

/// Discrete Gaussian sampler over Z using rejection sampling
#[derive(Clone)]
pub struct GaussianSampler {
    sigma: f64,
    /// Reject samples beyond this many units from zero
    tailcut: i64,
    rng: ChaCha20Rng,
}

impl GaussianSampler {
    /// Sampler seeded from OS entropy
    pub fn new(sigma: f64) -> Self {
        Self::from_rng(sigma, ChaCha20Rng::from_entropy())
    }

    /// Seeded sampler for reproducibility
    pub fn with_seed(sigma: f64, seed: u64) -> Self {
        Self::from_rng(sigma, ChaCha20Rng::seed_from_u64(seed))
    }

    fn from_rng(sigma: f64, rng: ChaCha20Rng) -> Self {
        Self {
            sigma,
            tailcut: (sigma * 6.0).ceil() as i64,
            rng,
        }
    }

    /// Standard deviation
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Sample a single value from D_σ
    pub fn sample(&mut self) -> i64 {
        let two_sigma_sq = 2.0 * self.sigma * self.sigma;
        loop {
            let x = self.rng.gen_range(-self.tailcut..=self.tailcut);
            let prob = (-((x * x) as f64) / two_sigma_sq).exp();
            if self.rng.gen::<f64>() < prob {
                return x;
            }
        }
    }

    /// Sample `len` signed values
    pub fn sample_vec(&mut self, len: usize) -> Vec<i64> {
        (0..len).map(|_| self.sample()).collect()
    }

    /// Uniform ternary vector over {-1, 0, 1}
    pub fn sample_ternary(&mut self, len: usize) -> Vec<i64> {
        (0..len).map(|_| self.rng.gen_range(-1i64..=1)).collect()
    }

    /// Uniform vector over `[0, q)`
    pub fn sample_uniform(&mut self, len: usize, q: u64) -> Vec<u64> {
        (0..len).map(|_| self.rng.gen_range(0..q)).collect()
    }
}

impl std::fmt::Debug for GaussianSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaussianSampler")
            .field("sigma", &self.sigma)
            .field("tailcut", &self.tailcut)
            .finish()
    }
}
