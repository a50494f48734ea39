//! Key switching with an RNS-digit gadget

use super::context::BfvContext;
use super::keys::KeySwitchKey;
use crate::math::Poly;

/// Switch a polynomial multiplying `s'` into a pair under `s`.
///
/// Given `c` (coefficient domain, any level `l`) and a key from `s'` to `s`,
/// returns `(k0, k1)` in coefficient domain with `k0 + k1·s ≈ c·s'`.
///
/// # Algorithm
///
/// 1. For each active limb `i`, split the residues of `c` into base-`2^w`
///    digits `d_ij`, so that `c ≡ Σ_j d_ij·2^{w·j}` modulo `q_i`
/// 2. Key row `(i, j)` carries `2^{w·j}·s'` on limb `i` only, so the
///    sum over `i` recombines `c·s'` by CRT
/// 3. Accumulate `Σ_ij d_ij · K[i][j]` in NTT domain over the moduli of `l`
///
/// The added noise is bounded by `N · (l+1) · digits · 2^w · B_e`.
pub fn key_switch(ctx: &BfvContext, c: &Poly, key: &KeySwitchKey) -> (Poly, Poly) {
    assert!(!c.is_ntt(), "Key switching input must be in coefficient domain");
    let n = c.dimension();
    let moduli = c.moduli();
    assert!(
        key.limb_count() >= moduli.len(),
        "Key-switching key does not cover this level"
    );
    let w = ctx.params().ks_base_bits;
    let mask = (1u64 << w) - 1;

    let mut acc0 = Poly::zero(n, moduli);
    let mut acc1 = Poly::zero(n, moduli);
    acc0.to_ntt(ctx.ntt());
    acc1.to_ntt(ctx.ntt());

    let mut digits = vec![0u64; n];
    for (i, (limb, _)) in c.limbs().enumerate() {
        for j in 0..key.digits(i) {
            let shift = w * j as u32;
            for (d, &v) in digits.iter_mut().zip(limb) {
                *d = (v >> shift) & mask;
            }
            let mut digit_poly = Poly::from_small(&digits, moduli);
            digit_poly.to_ntt(ctx.ntt());

            let (b, a) = key.row(i, j);
            acc0.mul_acc_ntt_domain(&digit_poly, b, ctx.ntt());
            acc1.mul_acc_ntt_domain(&digit_poly, a, ctx.ntt());
        }
    }

    acc0.from_ntt(ctx.ntt());
    acc1.from_ntt(ctx.ntt());
    (acc0, acc1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bfv::keys::{RelinKey, SecretKey};
    use crate::math::modular::center;
    use crate::math::GaussianSampler;
    use crate::params::BfvParams;
    use crate::scheme::Level;

    #[test]
    fn test_relin_key_switch_recovers_c_times_s_squared() {
        let ctx = BfvContext::new(BfvParams::insecure_test()).unwrap();
        let mut sampler = GaussianSampler::with_seed(ctx.params().sigma, 11);
        let sk = SecretKey::generate(&ctx, &mut sampler);
        let rk = RelinKey::generate(&ctx, &sk, &mut sampler);

        for level in [ctx.top_level(), Level::new(1), Level::LAST] {
            let moduli = ctx.moduli_at(level);
            let c = Poly::random(ctx.ring_dim(), moduli, &mut sampler);
            let (k0, k1) = key_switch(&ctx, &c, &rk.0);

            // k0 + k1·s - c·s^2 must be small
            let s = sk.ntt().truncated(moduli.len());
            let s2 = s.mul_ntt_domain(&s, ctx.ntt());
            let mut k1_ntt = k1.clone();
            k1_ntt.to_ntt(ctx.ntt());
            let mut c_ntt = c.clone();
            c_ntt.to_ntt(ctx.ntt());
            let mut diff = &k1_ntt.mul_ntt_domain(&s, ctx.ntt()) - &c_ntt.mul_ntt_domain(&s2, ctx.ntt());
            diff.from_ntt(ctx.ntt());
            diff += &k0;

            for (limb, q) in diff.limbs() {
                for &v in limb {
                    assert!(center(v, q).unsigned_abs() < 1 << 40);
                }
            }
        }
    }
}
