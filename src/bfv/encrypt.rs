//! Encryption, decryption and noise measurement

use num_bigint::{BigInt, BigUint};
use num_traits::{ToPrimitive, Zero};

use super::context::BfvContext;
use super::keys::{PublicKey, SecretKey};
use super::types::Ciphertext;
use crate::math::modular::mul_mod;
use crate::math::{GaussianSampler, Poly};
use crate::scheme::Level;

/// `Δ·m` over the moduli of `level`, coefficient domain
pub(crate) fn scaled_message(ctx: &BfvContext, level: Level, coeffs: &[u64]) -> Poly {
    let n = ctx.ring_dim();
    assert_eq!(coeffs.len(), n, "Plaintext must have N coefficients");
    let moduli = ctx.moduli_at(level);
    let t = ctx.plain_modulus();
    let mut poly = Poly::zero(n, moduli);
    for (i, (&delta, &q)) in ctx.delta_at(level).iter().zip(moduli).enumerate() {
        for (out, &m) in poly.limb_mut(i).iter_mut().zip(coeffs) {
            *out = mul_mod(delta, m % t, q);
        }
    }
    poly
}

impl SecretKey {
    /// Symmetric encryption of `coeffs` (values mod t) at the top level
    pub fn encrypt(
        &self,
        ctx: &BfvContext,
        coeffs: &[u64],
        sampler: &mut GaussianSampler,
    ) -> Ciphertext {
        let n = ctx.ring_dim();
        let moduli = &ctx.params().moduli;

        let mut a = Poly::random(n, moduli, sampler);
        a.to_ntt(ctx.ntt());
        let mut c0 = -&a.mul_ntt_domain(self.ntt(), ctx.ntt());
        c0.from_ntt(ctx.ntt());
        a.from_ntt(ctx.ntt());

        c0 += &Poly::sample_gaussian(n, moduli, sampler);
        c0 += &scaled_message(ctx, ctx.top_level(), coeffs);
        Ciphertext::from_polys(vec![c0, a])
    }

    /// Decrypt to coefficients mod t
    pub fn decrypt(&self, ctx: &BfvContext, ct: &Ciphertext) -> Vec<u64> {
        let phase = self.phase(ctx, ct);
        let base = ctx.base_at(ct.level());
        let t = ctx.plain_modulus();
        let q = base.product();
        let half = q >> 1u32;

        residues_per_coeff(&phase)
            .map(|residues| {
                let x = base.compose(&residues);
                let m = (x * t + &half) / q % t;
                m.to_u64().unwrap_or(0)
            })
            .collect()
    }

    /// Remaining invariant noise budget in bits, 0 once decryption may fail.
    ///
    /// Measures `[t·(c_0 + c_1·s + ...)]_Q`, whose infinity norm is
    /// `t·|e|`; the budget is how many more bits that value can grow before
    /// reaching `Q/2`.
    pub fn noise_budget(&self, ctx: &BfvContext, ct: &Ciphertext) -> u32 {
        let phase = self.phase(ctx, ct);
        let base = ctx.base_at(ct.level());
        let t = ctx.plain_modulus();

        let max_noise = residues_per_coeff(&phase)
            .map(|residues| {
                let x = base.compose(&residues);
                let scaled: BigUint = (x * t) % base.product();
                let centered: BigInt = base.center(scaled);
                centered.magnitude().clone()
            })
            .max()
            .unwrap_or_else(BigUint::zero);

        let q_bits = base.bits() as i64;
        let noise_bits = max_noise.bits() as i64;
        (q_bits - noise_bits - 1).max(0) as u32
    }

    /// `c_0 + c_1·s + c_2·s^2 + ...` in coefficient domain
    fn phase(&self, ctx: &BfvContext, ct: &Ciphertext) -> Poly {
        let limbs = ct.level().modulus_count();
        let s = self.ntt().truncated(limbs);
        let to_ntt = |p: &Poly| {
            let mut p = p.clone();
            p.to_ntt(ctx.ntt());
            p
        };

        let polys = ct.polys();
        let mut acc = to_ntt(&polys[polys.len() - 1]);
        for p in polys[..polys.len() - 1].iter().rev() {
            acc = acc.mul_ntt_domain(&s, ctx.ntt());
            acc += &to_ntt(p);
        }
        acc.from_ntt(ctx.ntt());
        acc
    }
}

impl PublicKey {
    /// Public-key encryption of `coeffs` (values mod t) at the top level
    pub fn encrypt(
        &self,
        ctx: &BfvContext,
        coeffs: &[u64],
        sampler: &mut GaussianSampler,
    ) -> Ciphertext {
        let n = ctx.ring_dim();
        let moduli = &ctx.params().moduli;

        let mut u = Poly::sample_ternary(n, moduli, sampler);
        u.to_ntt(ctx.ntt());

        let mut c0 = self.b.mul_ntt_domain(&u, ctx.ntt());
        let mut c1 = self.a.mul_ntt_domain(&u, ctx.ntt());
        c0.from_ntt(ctx.ntt());
        c1.from_ntt(ctx.ntt());

        c0 += &Poly::sample_gaussian(n, moduli, sampler);
        c0 += &scaled_message(ctx, ctx.top_level(), coeffs);
        c1 += &Poly::sample_gaussian(n, moduli, sampler);
        Ciphertext::from_polys(vec![c0, c1])
    }
}

/// Residues of each coefficient across the limbs of `poly`
pub(crate) fn residues_per_coeff(poly: &Poly) -> impl Iterator<Item = Vec<u64>> + '_ {
    (0..poly.dimension()).map(move |k| poly.limbs().map(|(limb, _)| limb[k]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bfv::keys::PublicKey;
    use crate::params::BfvParams;

    fn setup() -> (BfvContext, SecretKey, GaussianSampler) {
        let ctx = BfvContext::new(BfvParams::insecure_test()).unwrap();
        let mut sampler = GaussianSampler::with_seed(ctx.params().sigma, 3);
        let sk = SecretKey::generate(&ctx, &mut sampler);
        (ctx, sk, sampler)
    }

    fn message(n: usize, t: u64) -> Vec<u64> {
        (0..n as u64).map(|i| (i * 37 + 5) % t).collect()
    }

    #[test]
    fn test_symmetric_roundtrip() {
        let (ctx, sk, mut sampler) = setup();
        let msg = message(ctx.ring_dim(), ctx.plain_modulus());
        let ct = sk.encrypt(&ctx, &msg, &mut sampler);
        assert_eq!(ct.level(), ctx.top_level());
        assert_eq!(sk.decrypt(&ctx, &ct), msg);
    }

    #[test]
    fn test_public_key_roundtrip() {
        let (ctx, sk, mut sampler) = setup();
        let pk = PublicKey::generate(&ctx, &sk, &mut sampler);
        let msg = message(ctx.ring_dim(), ctx.plain_modulus());
        let ct = pk.encrypt(&ctx, &msg, &mut sampler);
        assert_eq!(sk.decrypt(&ctx, &ct), msg);
    }

    #[test]
    fn test_fresh_noise_budget() {
        let (ctx, sk, mut sampler) = setup();
        let ct = sk.encrypt(&ctx, &vec![1; ctx.ring_dim()], &mut sampler);
        let budget = sk.noise_budget(&ctx, &ct);
        // 240-bit chain, t ≈ 2^8, fresh noise well under 2^10
        assert!(budget > 200, "budget {budget}");
    }

    #[test]
    fn test_noise_budget_zero_for_garbage() {
        let (ctx, sk, mut sampler) = setup();
        let moduli = &ctx.params().moduli;
        let n = ctx.ring_dim();
        let ct = Ciphertext::from_polys(vec![
            Poly::random(n, moduli, &mut sampler),
            Poly::random(n, moduli, &mut sampler),
        ]);
        assert!(sk.noise_budget(&ctx, &ct) < 3);
    }
}
