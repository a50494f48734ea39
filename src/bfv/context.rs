//! Precomputed per-parameter-set data shared by keys, encryptors and the evaluator

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use tracing::debug;

use crate::error::{Error, Result};
use crate::math::modular::{bit_length, inv_mod};
use crate::math::primes::ntt_primes;
use crate::math::{NttContext, RnsBase};
use crate::params::BfvParams;
use crate::scheme::Level;

/// Bit size of the auxiliary primes used to hold exact tensor products
const AUX_PRIME_BITS: u32 = 61;

/// Everything derived from [`BfvParams`] once
#[derive(Debug)]
pub struct BfvContext {
    params: BfvParams,
    /// NTT tables for the whole modulus chain; lower levels use a prefix
    ntt: NttContext,
    /// CRT data for each level's active moduli, indexed by chain index
    level_bases: Vec<RnsBase>,
    /// `floor(Q_l / t) mod q_i`, indexed by chain index then limb
    delta: Vec<Vec<u64>>,
    /// `q_l^{-1} mod q_j` for `j < l`, indexed by chain index `l`
    last_inv: Vec<Vec<u64>>,
    /// NTT tables and CRT data for the auxiliary tensoring base
    aux_ntt: NttContext,
    aux_base: RnsBase,
}

impl BfvContext {
    /// Validate `params` and precompute all tables
    pub fn new(params: BfvParams) -> Result<Self> {
        params.validate().map_err(Error::InvalidParameters)?;
        let n = params.ring_dim;
        let t = params.plain_modulus;
        let ntt = NttContext::with_moduli(n, &params.moduli);

        let level_bases: Vec<RnsBase> = (1..=params.moduli.len())
            .map(|k| RnsBase::new(&params.moduli[..k]))
            .collect();

        let delta = level_bases
            .iter()
            .map(|base| {
                let d: BigUint = base.product() / t;
                base.moduli()
                    .iter()
                    .map(|&q| (&d % q).to_u64().unwrap_or(0))
                    .collect()
            })
            .collect();

        let mut last_inv = Vec::with_capacity(params.moduli.len());
        for l in 0..params.moduli.len() {
            let q_last = params.moduli[l];
            let row = params.moduli[..l]
                .iter()
                .map(|&q| {
                    inv_mod(q_last % q, q)
                        .ok_or(Error::InvalidParameters("moduli must be pairwise coprime"))
                })
                .collect::<Result<Vec<u64>>>()?;
            last_inv.push(row);
        }

        // The tensor of two top-level ciphertexts is bounded by N * Q^2 / 2;
        // the auxiliary base must hold it with room for the sign.
        let top_bits = level_bases[params.top_level()].bits();
        let log_n = n.trailing_zeros() as u64;
        let needed = 2 * top_bits + log_n + 2;
        let aux_count = needed.div_ceil(u64::from(AUX_PRIME_BITS) - 1) as usize;
        let aux_moduli = ntt_primes(AUX_PRIME_BITS, n, aux_count, &params.moduli).ok_or(
            Error::InvalidParameters("not enough auxiliary NTT primes for this ring dimension"),
        )?;
        let aux_ntt = NttContext::with_moduli(n, &aux_moduli);
        let aux_base = RnsBase::new(&aux_moduli);

        debug!(
            ring_dim = n,
            plain_modulus = t,
            chain = params.moduli.len(),
            chain_bits = top_bits,
            aux_primes = aux_count,
            "bfv context ready"
        );

        Ok(Self {
            params,
            ntt,
            level_bases,
            delta,
            last_inv,
            aux_ntt,
            aux_base,
        })
    }

    pub fn params(&self) -> &BfvParams {
        &self.params
    }

    pub fn ring_dim(&self) -> usize {
        self.params.ring_dim
    }

    pub fn plain_modulus(&self) -> u64 {
        self.params.plain_modulus
    }

    /// Deepest level of the chain
    pub fn top_level(&self) -> Level {
        Level::new(self.params.top_level())
    }

    /// Moduli active at `level`
    pub fn moduli_at(&self, level: Level) -> &[u64] {
        self.check_level(level);
        &self.params.moduli[..level.modulus_count()]
    }

    /// NTT tables covering the whole chain
    pub fn ntt(&self) -> &NttContext {
        &self.ntt
    }

    /// CRT base of the moduli active at `level`
    pub fn base_at(&self, level: Level) -> &RnsBase {
        self.check_level(level);
        &self.level_bases[level.chain_index()]
    }

    /// `floor(Q_l / t)` reduced by each modulus of `level`
    pub fn delta_at(&self, level: Level) -> &[u64] {
        self.check_level(level);
        &self.delta[level.chain_index()]
    }

    /// Inverses of the last modulus of `level` modulo every other modulus of `level`
    pub fn last_modulus_inverses(&self, level: Level) -> &[u64] {
        self.check_level(level);
        &self.last_inv[level.chain_index()]
    }

    pub fn aux_ntt(&self) -> &NttContext {
        &self.aux_ntt
    }

    pub fn aux_base(&self) -> &RnsBase {
        &self.aux_base
    }

    /// Digits of the key-switching decomposition for modulus `q`
    pub fn ks_digits(&self, q: u64) -> usize {
        bit_length(q).div_ceil(self.params.ks_base_bits) as usize
    }

    fn check_level(&self, level: Level) {
        assert!(
            level.chain_index() <= self.params.top_level(),
            "Level {level} is beyond the modulus chain"
        );
    }
}
