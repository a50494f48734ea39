//! Secret, public, relinearization and Galois keys
//!
//! Key-switching keys use an RNS-digit decomposition: limb `i` of the input
//! is split into base-`2^w` digits, and for every (limb, digit) pair the key
//! holds an encryption of `2^{w·j} · s'` restricted to limb `i`. All keys are
//! stored in NTT form at the top level; lower levels read a limb prefix.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::context::BfvContext;
use super::galois::{automorphism_signed, is_valid_galois_element};
use crate::error::{config_err, Result};
use crate::math::modular::{add_mod, mul_mod, pow_mod};
use crate::math::{GaussianSampler, Poly};

/// Ternary secret key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretKey {
    /// Coefficients in {-1, 0, 1}
    values: Vec<i64>,
    /// NTT form over the whole chain
    ntt: Poly,
}

impl SecretKey {
    /// Sample a fresh ternary secret
    pub fn generate(ctx: &BfvContext, sampler: &mut GaussianSampler) -> Self {
        let values = sampler.sample_ternary(ctx.ring_dim());
        Self::from_values(ctx, values)
    }

    fn from_values(ctx: &BfvContext, values: Vec<i64>) -> Self {
        let mut ntt = Poly::from_signed(&values, &ctx.params().moduli);
        ntt.to_ntt(ctx.ntt());
        Self { values, ntt }
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// NTT form of `s` over the whole chain
    pub fn ntt(&self) -> &Poly {
        &self.ntt
    }
}

/// Public key `(b, a) = (-a·s + e, a)` in NTT form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub b: Poly,
    pub a: Poly,
}

impl PublicKey {
    pub fn generate(ctx: &BfvContext, sk: &SecretKey, sampler: &mut GaussianSampler) -> Self {
        let (b, a) = rlwe_sample(ctx, sk, sampler);
        Self { b, a }
    }
}

/// Key-switching key from some `s'` to the secret key `s`.
///
/// `rows[i][j] = (b, a)` with `b = -a·s + e + 2^{w·j}·s'·[limb i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySwitchKey {
    rows: Vec<Vec<(Poly, Poly)>>,
}

impl KeySwitchKey {
    /// Generate a key switching from `target` (NTT form over the whole chain)
    pub fn generate(
        ctx: &BfvContext,
        sk: &SecretKey,
        target: &Poly,
        sampler: &mut GaussianSampler,
    ) -> Self {
        assert!(target.is_ntt(), "Key-switching target must be in NTT domain");
        let w = ctx.params().ks_base_bits;

        let rows = ctx
            .params()
            .moduli
            .iter()
            .enumerate()
            .map(|(i, &q)| {
                (0..ctx.ks_digits(q))
                    .map(|j| {
                        let (mut b, a) = rlwe_sample(ctx, sk, sampler);
                        let gadget = pow_mod(2, w as u64 * j as u64, q);
                        for (bc, &tc) in b.limb_mut(i).iter_mut().zip(target.limb(i)) {
                            *bc = add_mod(*bc, mul_mod(tc, gadget, q), q);
                        }
                        (b, a)
                    })
                    .collect()
            })
            .collect();

        Self { rows }
    }

    /// Key pair for limb `limb`, digit `digit`
    pub fn row(&self, limb: usize, digit: usize) -> &(Poly, Poly) {
        &self.rows[limb][digit]
    }

    /// Digits stored for limb `limb`
    pub fn digits(&self, limb: usize) -> usize {
        self.rows[limb].len()
    }

    pub fn limb_count(&self) -> usize {
        self.rows.len()
    }
}

/// Relinearization key: switches `s^2` to `s`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelinKey(pub KeySwitchKey);

impl RelinKey {
    pub fn generate(ctx: &BfvContext, sk: &SecretKey, sampler: &mut GaussianSampler) -> Self {
        let s_squared = sk.ntt().mul_ntt_domain(sk.ntt(), ctx.ntt());
        Self(KeySwitchKey::generate(ctx, sk, &s_squared, sampler))
    }
}

/// Galois keys: for each element `g`, switches `τ_g(s)` to `s`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaloisKeys {
    keys: BTreeMap<usize, KeySwitchKey>,
}

impl GaloisKeys {
    /// Generate keys for every element of `elements`
    pub fn generate(
        ctx: &BfvContext,
        sk: &SecretKey,
        elements: &[usize],
        sampler: &mut GaussianSampler,
    ) -> Result<Self> {
        let n = ctx.ring_dim();
        let mut keys = BTreeMap::new();
        for &g in elements {
            if !is_valid_galois_element(g, n) {
                return Err(config_err!("{} is not a Galois element for N = {}", g, n));
            }
            if keys.contains_key(&g) {
                continue;
            }
            let rotated = automorphism_signed(sk.values(), g);
            let mut target = Poly::from_signed(&rotated, &ctx.params().moduli);
            target.to_ntt(ctx.ntt());
            keys.insert(g, KeySwitchKey::generate(ctx, sk, &target, sampler));
        }
        debug!(count = keys.len(), "generated galois keys");
        Ok(Self { keys })
    }

    pub fn get(&self, galois_elt: usize) -> Option<&KeySwitchKey> {
        self.keys.get(&galois_elt)
    }

    /// Elements with a key, ascending
    pub fn elements(&self) -> impl Iterator<Item = usize> + '_ {
        self.keys.keys().copied()
    }
}

/// Everything the server needs to evaluate on ciphertexts of one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationKeys {
    pub public_key: PublicKey,
    pub relin_key: RelinKey,
    pub galois_keys: GaloisKeys,
}

impl EvaluationKeys {
    /// Generate a full key set for `galois_elements`
    pub fn generate(
        ctx: &BfvContext,
        sk: &SecretKey,
        galois_elements: &[usize],
        sampler: &mut GaussianSampler,
    ) -> Result<Self> {
        Ok(Self {
            public_key: PublicKey::generate(ctx, sk, sampler),
            relin_key: RelinKey::generate(ctx, sk, sampler),
            galois_keys: GaloisKeys::generate(ctx, sk, galois_elements, sampler)?,
        })
    }
}

/// Fresh RLWE sample `(-a·s + e, a)` in NTT form over the whole chain
fn rlwe_sample(ctx: &BfvContext, sk: &SecretKey, sampler: &mut GaussianSampler) -> (Poly, Poly) {
    let n = ctx.ring_dim();
    let moduli = &ctx.params().moduli;

    let mut a = Poly::random(n, moduli, sampler);
    a.to_ntt(ctx.ntt());
    let mut e = Poly::sample_gaussian(n, moduli, sampler);
    e.to_ntt(ctx.ntt());

    let a_s = a.mul_ntt_domain(sk.ntt(), ctx.ntt());
    let b = &e - &a_s;
    (b, a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::BfvParams;

    fn setup() -> (BfvContext, SecretKey, GaussianSampler) {
        let ctx = BfvContext::new(BfvParams::insecure_test()).unwrap();
        let mut sampler = GaussianSampler::with_seed(ctx.params().sigma, 7);
        let sk = SecretKey::generate(&ctx, &mut sampler);
        (ctx, sk, sampler)
    }

    #[test]
    fn test_public_key_is_small_noise() {
        let (ctx, sk, mut sampler) = setup();
        let pk = PublicKey::generate(&ctx, &sk, &mut sampler);

        // b + a·s = e
        let mut e = &pk.b + &pk.a.mul_ntt_domain(sk.ntt(), ctx.ntt());
        e.from_ntt(ctx.ntt());
        for (limb, q) in e.limbs() {
            for &c in limb {
                let centered = crate::math::modular::center(c, q);
                assert!(centered.abs() <= 20, "noise coefficient {centered} too large");
            }
        }
    }

    #[test]
    fn test_key_switch_key_shape() {
        let (ctx, sk, mut sampler) = setup();
        let rk = RelinKey::generate(&ctx, &sk, &mut sampler);
        assert_eq!(rk.0.limb_count(), 4);
        // 60-bit moduli in base 2^20
        assert_eq!(rk.0.digits(0), 3);
        assert!(rk.0.row(3, 2).0.is_ntt());
    }

    #[test]
    fn test_galois_keys_reject_even_element() {
        let (ctx, sk, mut sampler) = setup();
        assert!(GaloisKeys::generate(&ctx, &sk, &[4], &mut sampler).is_err());

        let keys = GaloisKeys::generate(&ctx, &sk, &[65, 33, 65], &mut sampler).unwrap();
        assert_eq!(keys.elements().collect::<Vec<_>>(), vec![33, 65]);
        assert!(keys.get(17).is_none());
    }

    #[test]
    fn test_secret_key_ternary() {
        let (_, sk, _) = setup();
        assert!(sk.values().iter().all(|v| (-1..=1).contains(v)));
    }
}
