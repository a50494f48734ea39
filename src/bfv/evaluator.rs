//! Server-side evaluation: [`SchemeAdapter`] for the BFV backend

use std::sync::Arc;

use super::context::BfvContext;
use super::encrypt::scaled_message;
use super::galois::{apply_automorphism, multiply_by_monomial};
use super::keys::EvaluationKeys;
use super::keyswitch::key_switch;
use super::tensor::tensor;
use super::types::{Ciphertext, Plaintext};
use crate::math::modular::{center, lift_centered, mul_mod, reduce_signed, sub_mod};
use crate::math::{GaussianSampler, Poly};
use crate::scheme::{Level, SchemeAdapter};

/// BFV evaluator holding one client's evaluation keys.
///
/// Immutable after construction; share it across request threads by reference
/// or behind an `Arc`.
#[derive(Debug, Clone)]
pub struct BfvEvaluator {
    ctx: Arc<BfvContext>,
    keys: EvaluationKeys,
}

impl BfvEvaluator {
    pub fn new(ctx: Arc<BfvContext>, keys: EvaluationKeys) -> Self {
        Self { ctx, keys }
    }

    pub fn context(&self) -> &BfvContext {
        &self.ctx
    }

    pub fn keys(&self) -> &EvaluationKeys {
        &self.keys
    }

    /// Centered lift of a plaintext into the moduli of `level`
    fn lift_plain(&self, coeffs: &[u64], level: Level) -> Poly {
        let t = self.ctx.plain_modulus();
        let moduli = self.ctx.moduli_at(level);
        let mut poly = Poly::zero(self.ctx.ring_dim(), moduli);
        for (i, &q) in moduli.iter().enumerate() {
            for (out, &c) in poly.limb_mut(i).iter_mut().zip(coeffs) {
                *out = lift_centered(c, t, q);
            }
        }
        poly
    }

    fn assert_same_shape(&self, a: &Ciphertext, b: &Ciphertext) {
        assert_eq!(
            a.level(),
            b.level(),
            "Ciphertext levels must match ({} vs {})",
            a.level(),
            b.level()
        );
        assert_eq!(a.is_ntt(), b.is_ntt(), "NTT domains must match");
    }
}

/// Divide out the last modulus of a coefficient-domain polynomial:
/// `c' = (c - [c]_{q_l}) · q_l^{-1}` with the centered remainder
fn rescale_poly(poly: &mut Poly, inverses: &[u64]) {
    let q_last = poly.moduli()[poly.limb_count() - 1];
    let last = poly.drop_last_limb();
    for (j, &inv) in inverses.iter().enumerate() {
        let q = poly.moduli()[j];
        for (c, &r) in poly.limb_mut(j).iter_mut().zip(&last) {
            let r = reduce_signed(center(r, q_last), q);
            *c = mul_mod(sub_mod(*c, r, q), inv, q);
        }
    }
}

impl SchemeAdapter for BfvEvaluator {
    type Ciphertext = Ciphertext;
    type Plaintext = Plaintext;

    fn ring_degree(&self) -> usize {
        self.ctx.ring_dim()
    }

    fn plain_modulus(&self) -> u64 {
        self.ctx.plain_modulus()
    }

    fn top_level(&self) -> Level {
        self.ctx.top_level()
    }

    fn moduli_at(&self, level: Level) -> &[u64] {
        self.ctx.moduli_at(level)
    }

    fn level_of(&self, ct: &Ciphertext) -> Level {
        ct.level()
    }

    fn is_ntt(&self, ct: &Ciphertext) -> bool {
        ct.is_ntt()
    }

    fn rank(&self, ct: &Ciphertext) -> usize {
        ct.rank()
    }

    fn fits_chain(&self, ct: &Ciphertext) -> bool {
        ct.ring_dim() == self.ctx.ring_dim()
            && ct.level() <= self.ctx.top_level()
            && ct.moduli() == self.ctx.moduli_at(ct.level())
    }

    fn plain_ntt_level(&self, pt: &Plaintext) -> Option<Level> {
        pt.ntt_level()
    }

    fn add_assign(&self, acc: &mut Ciphertext, other: &Ciphertext) {
        self.assert_same_shape(acc, other);
        while acc.rank() < other.rank() {
            acc.push_zero(self.ctx.ntt());
        }
        for (a, b) in acc.polys_mut().iter_mut().zip(other.polys()) {
            *a += b;
        }
    }

    fn sub_assign(&self, acc: &mut Ciphertext, other: &Ciphertext) {
        self.assert_same_shape(acc, other);
        while acc.rank() < other.rank() {
            acc.push_zero(self.ctx.ntt());
        }
        for (a, b) in acc.polys_mut().iter_mut().zip(other.polys()) {
            *a -= b;
        }
    }

    fn multiply(&self, a: &Ciphertext, b: &Ciphertext) -> Ciphertext {
        tensor(&self.ctx, a, Some(b))
    }

    fn square(&self, a: &Ciphertext) -> Ciphertext {
        tensor(&self.ctx, a, None)
    }

    fn relinearize(&self, ct: Ciphertext) -> Ciphertext {
        let ct = self.transform_from_ntt(ct);
        match ct.rank() {
            2 => ct,
            3 => {
                let mut polys = ct.into_polys();
                let c2 = polys.pop().unwrap_or_default();
                let (k0, k1) = key_switch(&self.ctx, &c2, &self.keys.relin_key.0);
                polys[0] += &k0;
                polys[1] += &k1;
                Ciphertext::from_polys(polys)
            }
            r => panic!("Cannot relinearize a rank-{r} ciphertext"),
        }
    }

    fn multiply_plain_assign(&self, ct: &mut Ciphertext, pt: &Plaintext) {
        match pt {
            Plaintext::Ntt { level, poly } => {
                assert!(ct.is_ntt(), "NTT plaintext requires an NTT-domain ciphertext");
                assert_eq!(
                    ct.level(),
                    *level,
                    "Plaintext was transformed for {} but the ciphertext is at {}",
                    level,
                    ct.level()
                );
                for p in ct.polys_mut() {
                    *p = p.mul_ntt_domain(poly, self.ctx.ntt());
                }
            }
            Plaintext::Coeff(coeffs) => {
                assert!(
                    !ct.is_ntt(),
                    "Coefficient plaintext requires a coefficient-domain ciphertext"
                );
                let level = ct.level();
                if pt.is_constant() {
                    let t = self.ctx.plain_modulus();
                    let scalars: Vec<u64> = self
                        .ctx
                        .moduli_at(level)
                        .iter()
                        .map(|&q| lift_centered(coeffs[0], t, q))
                        .collect();
                    for p in ct.polys_mut() {
                        p.rns_scalar_mul_assign(&scalars);
                    }
                    return;
                }
                let mut lifted = self.lift_plain(coeffs, level);
                lifted.to_ntt(self.ctx.ntt());
                for p in ct.polys_mut() {
                    p.to_ntt(self.ctx.ntt());
                    *p = p.mul_ntt_domain(&lifted, self.ctx.ntt());
                    p.from_ntt(self.ctx.ntt());
                }
            }
        }
    }

    fn add_plain_assign(&self, ct: &mut Ciphertext, pt: &Plaintext) {
        assert!(!ct.is_ntt(), "add_plain requires a coefficient-domain ciphertext");
        let level = ct.level();
        let scaled = scaled_message(&self.ctx, level, self.plaintext_coeffs(pt));
        ct.polys_mut()[0] += &scaled;
    }

    fn mod_switch_to_next(&self, ct: Ciphertext) -> Ciphertext {
        let level = ct.level();
        assert!(
            level.next().is_some(),
            "Cannot switch below the last level"
        );
        let was_ntt = ct.is_ntt();
        let mut ct = self.transform_from_ntt(ct);
        let inverses = self.ctx.last_modulus_inverses(level);
        for p in ct.polys_mut() {
            rescale_poly(p, inverses);
        }
        if was_ntt {
            self.transform_to_ntt(ct)
        } else {
            ct
        }
    }

    fn transform_to_ntt(&self, mut ct: Ciphertext) -> Ciphertext {
        for p in ct.polys_mut() {
            p.to_ntt(self.ctx.ntt());
        }
        ct
    }

    fn transform_from_ntt(&self, mut ct: Ciphertext) -> Ciphertext {
        for p in ct.polys_mut() {
            p.from_ntt(self.ctx.ntt());
        }
        ct
    }

    fn transform_plain_to_ntt(&self, pt: &Plaintext, level: Level) -> Plaintext {
        match pt {
            Plaintext::Coeff(coeffs) => {
                let mut poly = self.lift_plain(coeffs, level);
                poly.to_ntt(self.ctx.ntt());
                Plaintext::Ntt { level, poly }
            }
            Plaintext::Ntt { level: have, .. } => {
                assert_eq!(
                    *have, level,
                    "Plaintext already transformed for {have}, requested {level}"
                );
                pt.clone()
            }
        }
    }

    fn apply_galois(&self, ct: &Ciphertext, galois_elt: usize) -> Ciphertext {
        assert_eq!(ct.rank(), 2, "Galois automorphism requires rank 2");
        assert!(!ct.is_ntt(), "Galois automorphism requires coefficient domain");
        let key = self
            .keys
            .galois_keys
            .get(galois_elt)
            .unwrap_or_else(|| panic!("No Galois key loaded for element {galois_elt}"));

        let c0 = apply_automorphism(&ct.polys()[0], galois_elt);
        let c1 = apply_automorphism(&ct.polys()[1], galois_elt);
        let (k0, k1) = key_switch(&self.ctx, &c1, key);
        Ciphertext::from_polys(vec![&c0 + &k0, k1])
    }

    fn has_galois_key(&self, galois_elt: usize) -> bool {
        self.keys.galois_keys.get(galois_elt).is_some()
    }

    fn multiply_power_of_x(&self, ct: &Ciphertext, k: usize) -> Ciphertext {
        assert!(!ct.is_ntt(), "Monomial shift requires coefficient domain");
        Ciphertext::from_polys(
            ct.polys()
                .iter()
                .map(|p| multiply_by_monomial(p, k))
                .collect(),
        )
    }

    fn encode_constant(&self, value: u64) -> Plaintext {
        let mut coeffs = vec![0u64; self.ctx.ring_dim()];
        coeffs[0] = value % self.ctx.plain_modulus();
        Plaintext::Coeff(coeffs)
    }

    fn encrypt(&self, pt: &Plaintext) -> Ciphertext {
        let mut sampler = GaussianSampler::new(self.ctx.params().sigma);
        self.keys
            .public_key
            .encrypt(&self.ctx, self.plaintext_coeffs(pt), &mut sampler)
    }

    fn zero_low_order_bits(&self, ct: &mut Ciphertext, bits: u32) {
        assert_eq!(
            ct.level(),
            Level::LAST,
            "Low-order bits can only be dropped at a single-modulus level"
        );
        assert!(!ct.is_ntt(), "Low-order bits are defined in coefficient domain");
        let mask = if bits >= 64 { 0 } else { !((1u64 << bits) - 1) };
        for p in ct.polys_mut() {
            for c in p.limb_mut(0) {
                *c &= mask;
            }
        }
    }

    fn ciphertext_limbs<'a>(&self, ct: &'a Ciphertext) -> Vec<&'a [u64]> {
        assert!(!ct.is_ntt(), "Raw limbs are read in coefficient domain");
        ct.polys()
            .iter()
            .flat_map(|p| p.limbs().map(|(limb, _)| limb))
            .collect()
    }

    fn ciphertext_from_limbs(&self, limbs: Vec<Vec<u64>>, rank: usize, level: Level) -> Ciphertext {
        let per_poly = level.modulus_count();
        assert_eq!(
            limbs.len(),
            rank * per_poly,
            "Expected {} limbs for rank {} at {}",
            rank * per_poly,
            rank,
            level
        );
        let n = self.ctx.ring_dim();
        let moduli = self.ctx.moduli_at(level);
        let polys = limbs
            .chunks(per_poly)
            .map(|chunk| {
                let mut coeffs = Vec::with_capacity(n * per_poly);
                for limb in chunk {
                    assert_eq!(limb.len(), n, "Limb length must equal the ring degree");
                    coeffs.extend_from_slice(limb);
                }
                Poly::from_coeffs(coeffs, moduli)
            })
            .collect();
        Ciphertext::from_polys(polys)
    }

    fn plaintext_from_coeffs(&self, mut coeffs: Vec<u64>) -> Plaintext {
        let n = self.ctx.ring_dim();
        assert!(coeffs.len() <= n, "Plaintext has more than N coefficients");
        let t = self.ctx.plain_modulus();
        coeffs.iter_mut().for_each(|c| *c %= t);
        coeffs.resize(n, 0);
        Plaintext::Coeff(coeffs)
    }

    fn plaintext_coeffs<'a>(&self, pt: &'a Plaintext) -> &'a [u64] {
        match pt {
            Plaintext::Coeff(coeffs) => coeffs,
            Plaintext::Ntt { level, .. } => {
                panic!("Plaintext is in NTT form for {level}; coefficients are not available")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    fn fixture(galois: &[usize]) -> Fixture {
        Fixture::new(galois)
    }

    fn padded(values: &[u64], n: usize) -> Vec<u64> {
        let mut v = values.to_vec();
        v.resize(n, 0);
        v
    }

    #[test]
    fn test_add_sub() {
        let f = fixture(&[]);
        let n = f.eval.ring_degree();
        let mut a = f.encrypt(&[10, 20]);
        let b = f.encrypt(&[5, 250]);
        f.eval.add_assign(&mut a, &b);
        assert_eq!(f.decrypt(&a), padded(&[15, 13], n));
        f.eval.sub_assign(&mut a, &b);
        f.eval.sub_assign(&mut a, &b);
        assert_eq!(f.decrypt(&a), padded(&[5, 27], n));
    }

    #[test]
    fn test_multiply_relinearize() {
        let f = fixture(&[]);
        let n = f.eval.ring_degree();
        let a = f.encrypt(&[7]);
        let b = f.encrypt(&[0, 3]);
        let prod = f.eval.multiply(&a, &b);
        assert_eq!(prod.rank(), 3);
        let relin = f.eval.relinearize(prod);
        assert_eq!(relin.rank(), 2);
        assert!(!relin.is_ntt());
        assert_eq!(f.decrypt(&relin), padded(&[0, 21], n));

        let sq = f.eval.relinearize(f.eval.square(&a));
        assert_eq!(f.decrypt(&sq), padded(&[49], n));
    }

    #[test]
    fn test_add_mixed_rank() {
        let f = fixture(&[]);
        let n = f.eval.ring_degree();
        let a = f.encrypt(&[2]);
        let mut acc = f.encrypt(&[1]);
        let prod = f.eval.multiply(&a, &a);
        f.eval.add_assign(&mut acc, &prod);
        assert_eq!(acc.rank(), 3);
        assert_eq!(f.decrypt(&acc), padded(&[5], n));
    }

    #[test]
    fn test_plain_multiply_both_domains() {
        let f = fixture(&[]);
        let n = f.eval.ring_degree();
        let ct = f.encrypt(&[3, 1]);
        let pt = f.eval.plaintext_from_coeffs(vec![2, 0, 1]);

        let mut coeff = ct.clone();
        f.eval.multiply_plain_assign(&mut coeff, &pt);
        // (3 + X)(2 + X^2) = 6 + 2X + 3X^2 + X^3
        let expected = padded(&[6, 2, 3, 1], n);
        assert_eq!(f.decrypt(&coeff), expected);

        let level = ct.level();
        let mut ntt = f.eval.transform_to_ntt(ct);
        let pt_ntt = f.eval.transform_plain_to_ntt(&pt, level);
        assert_eq!(f.eval.plain_ntt_level(&pt_ntt), Some(level));
        f.eval.multiply_plain_assign(&mut ntt, &pt_ntt);
        assert_eq!(f.decrypt(&f.eval.transform_from_ntt(ntt)), expected);
    }

    #[test]
    fn test_constant_multiply_negative_lift() {
        let f = fixture(&[]);
        let n = f.eval.ring_degree();
        let mut ct = f.encrypt(&[4, 1]);
        // 256 ≡ -1 mod 257
        f.eval.multiply_plain_assign(&mut ct, &f.eval.encode_constant(256));
        assert_eq!(f.decrypt(&ct), padded(&[253, 256], n));
    }

    #[test]
    #[should_panic(expected = "transformed for")]
    fn test_plain_level_mismatch_panics() {
        let f = fixture(&[]);
        let ct = f.encrypt(&[1]);
        let pt = f.eval.plaintext_from_coeffs(vec![1]);
        let pt_ntt = f.eval.transform_plain_to_ntt(&pt, Level::new(1));
        let mut ct = f.eval.transform_to_ntt(ct);
        f.eval.multiply_plain_assign(&mut ct, &pt_ntt);
    }

    #[test]
    fn test_mod_switch_chain() {
        let f = fixture(&[]);
        let n = f.eval.ring_degree();
        let msg = padded(&[1, 2, 3, 256], n);
        let mut ct = f.encrypt(&msg);
        while let Some(next) = ct.level().next() {
            ct = f.eval.mod_switch_to_next(ct);
            assert_eq!(ct.level(), next);
            assert_eq!(f.decrypt(&ct), msg);
        }

        let ct = f.eval.transform_to_ntt(f.encrypt(&msg));
        let switched = f.eval.mod_switch_to_next(ct);
        assert!(switched.is_ntt());
        assert_eq!(f.decrypt(&switched), msg);
    }

    #[test]
    #[should_panic(expected = "below the last level")]
    fn test_mod_switch_past_last_panics() {
        let f = fixture(&[]);
        let mut ct = f.encrypt(&[1]);
        for _ in 0..4 {
            ct = f.eval.mod_switch_to_next(ct);
        }
    }

    #[test]
    fn test_galois_and_monomial() {
        let n = 64;
        let g = n + 1;
        let f = fixture(&[g]);
        assert!(f.eval.has_galois_key(g));
        assert!(!f.eval.has_galois_key(3));

        let ct = f.encrypt(&[5, 1, 2]);
        let rotated = f.eval.apply_galois(&ct, g);
        // X -> -X
        assert_eq!(f.decrypt(&rotated), padded(&[5, 256, 2], n));

        let shifted = f.eval.multiply_power_of_x(&ct, 2 * n - 1);
        let mut expected = padded(&[1, 2], n);
        expected[n - 1] = 257 - 5;
        assert_eq!(f.decrypt(&shifted), expected);
    }

    #[test]
    fn test_add_plain_and_public_encrypt() {
        let f = fixture(&[]);
        let n = f.eval.ring_degree();
        let pt = f.eval.plaintext_from_coeffs(vec![9, 8]);
        let mut ct = f.eval.encrypt(&pt);
        assert_eq!(ct.level(), f.eval.top_level());
        f.eval.add_plain_assign(&mut ct, &f.eval.encode_constant(1));
        assert_eq!(f.decrypt(&ct), padded(&[10, 8], n));

        let mut low = f.eval.mod_switch_to_next(ct);
        f.eval.add_plain_assign(&mut low, &pt);
        assert_eq!(f.decrypt(&low), padded(&[19, 16], n));
    }

    #[test]
    fn test_zero_low_order_bits_keeps_message() {
        let f = fixture(&[]);
        let n = f.eval.ring_degree();
        let msg = padded(&[42, 7], n);
        let mut ct = f.encrypt(&msg);
        for _ in 0..3 {
            ct = f.eval.mod_switch_to_next(ct);
        }
        f.eval.zero_low_order_bits(&mut ct, 30);
        assert!(ct.polys()[0].coeffs().iter().all(|c| c & ((1 << 30) - 1) == 0));
        assert_eq!(f.decrypt(&ct), msg);
    }

    #[test]
    fn test_limbs_roundtrip() {
        let f = fixture(&[]);
        let ct = f.encrypt(&[1, 2, 3]);
        let limbs: Vec<Vec<u64>> = f.eval.ciphertext_limbs(&ct).into_iter().map(<[u64]>::to_vec).collect();
        assert_eq!(limbs.len(), 2 * 4);
        let rebuilt = f.eval.ciphertext_from_limbs(limbs, 2, ct.level());
        assert_eq!(rebuilt, ct);
    }
}
