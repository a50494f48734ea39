//! RNS polynomials over R_Q = Z_Q[X]/(X^n + 1).
//!
//! A [`Poly`] carries one limb per prime of its modulus chain prefix, stored
//! back to back (`limb * n + coeff`). The number of limbs is what the rest of
//! the crate calls the chain level: a polynomial with `l + 1` limbs lives at
//! level `l`.
//!
//! Polynomials exist either in coefficient domain or in NTT domain. Mixing
//! domains, moduli or dimensions in one operation is a programming error and
//! panics.
//!
//! # Example
//!
//! ```
//! use hepir::math::{NttContext, Poly};
//!
//! let moduli = [1152921504606844417u64, 1152921504606844289];
//! let ctx = NttContext::with_moduli(64, &moduli);
//!
//! let mut p = Poly::from_signed(&[3; 64], &moduli);
//! p.to_ntt(&ctx);
//! p.from_ntt(&ctx);
//! assert_eq!(p.limb(1)[0], 3);
//! ```

use super::modular::{add_mod, mul_mod, neg_mod, reduce_signed, sub_mod};
use super::ntt::NttContext;
use super::sampler::GaussianSampler;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Polynomial in RNS form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poly {
    /// Limb-major coefficients (or NTT values in Montgomery form).
    coeffs: Vec<u64>,
    /// Moduli of the limbs, a prefix of the chain.
    moduli: Vec<u64>,
    /// Whether the values are in NTT domain.
    is_ntt: bool,
}

impl Poly {
    /// Zero polynomial in coefficient domain
    pub fn zero(n: usize, moduli: &[u64]) -> Self {
        Self {
            coeffs: vec![0; n * moduli.len()],
            moduli: moduli.to_vec(),
            is_ntt: false,
        }
    }

    /// Polynomial from limb-major coefficients, reducing each limb by its modulus
    pub fn from_coeffs(mut coeffs: Vec<u64>, moduli: &[u64]) -> Self {
        assert!(
            !moduli.is_empty() && coeffs.len() % moduli.len() == 0,
            "Coefficient count must be a multiple of the limb count"
        );
        let n = coeffs.len() / moduli.len();
        for (limb, &q) in coeffs.chunks_exact_mut(n).zip(moduli) {
            for c in limb.iter_mut() {
                *c %= q;
            }
        }
        Self {
            coeffs,
            moduli: moduli.to_vec(),
            is_ntt: false,
        }
    }

    /// Polynomial whose coefficients are the given signed integers in every limb
    pub fn from_signed(values: &[i64], moduli: &[u64]) -> Self {
        let n = values.len();
        let mut coeffs = Vec::with_capacity(n * moduli.len());
        for &q in moduli {
            coeffs.extend(values.iter().map(|&v| reduce_signed(v, q)));
        }
        Self {
            coeffs,
            moduli: moduli.to_vec(),
            is_ntt: false,
        }
    }

    /// Polynomial whose coefficients are the given small non-negative integers in every limb
    pub fn from_small(values: &[u64], moduli: &[u64]) -> Self {
        let n = values.len();
        let mut coeffs = Vec::with_capacity(n * moduli.len());
        for &q in moduli {
            coeffs.extend(values.iter().map(|&v| v % q));
        }
        Self {
            coeffs,
            moduli: moduli.to_vec(),
            is_ntt: false,
        }
    }

    /// Uniformly random polynomial
    pub fn random(n: usize, moduli: &[u64], sampler: &mut GaussianSampler) -> Self {
        let mut coeffs = Vec::with_capacity(n * moduli.len());
        for &q in moduli {
            coeffs.extend(sampler.sample_uniform(n, q));
        }
        Self {
            coeffs,
            moduli: moduli.to_vec(),
            is_ntt: false,
        }
    }

    /// Polynomial with discrete Gaussian coefficients
    pub fn sample_gaussian(n: usize, moduli: &[u64], sampler: &mut GaussianSampler) -> Self {
        Self::from_signed(&sampler.sample_vec(n), moduli)
    }

    /// Polynomial with uniform ternary coefficients
    pub fn sample_ternary(n: usize, moduli: &[u64], sampler: &mut GaussianSampler) -> Self {
        Self::from_signed(&sampler.sample_ternary(n), moduli)
    }

    /// Ring dimension
    pub fn dimension(&self) -> usize {
        if self.moduli.is_empty() {
            0
        } else {
            self.coeffs.len() / self.moduli.len()
        }
    }

    /// Moduli of the limbs
    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    /// Number of limbs
    pub fn limb_count(&self) -> usize {
        self.moduli.len()
    }

    /// Check if in NTT domain
    pub fn is_ntt(&self) -> bool {
        self.is_ntt
    }

    /// All limbs, limb-major
    pub fn coeffs(&self) -> &[u64] {
        &self.coeffs
    }

    /// The `i`-th limb
    pub fn limb(&self, i: usize) -> &[u64] {
        let n = self.dimension();
        &self.coeffs[i * n..(i + 1) * n]
    }

    /// Mutable access to the `i`-th limb
    pub fn limb_mut(&mut self, i: usize) -> &mut [u64] {
        let n = self.dimension();
        &mut self.coeffs[i * n..(i + 1) * n]
    }

    /// Iterate over `(limb, modulus)` pairs
    pub fn limbs(&self) -> impl Iterator<Item = (&[u64], u64)> {
        let n = self.dimension();
        self.coeffs.chunks_exact(n).zip(self.moduli.iter().copied())
    }

    /// Convert to NTT domain (no-op if already there)
    pub fn to_ntt(&mut self, ctx: &NttContext) {
        if !self.is_ntt {
            ctx.forward(&mut self.coeffs);
            self.is_ntt = true;
        }
    }

    /// Convert to coefficient domain (no-op if already there)
    pub fn from_ntt(&mut self, ctx: &NttContext) {
        if self.is_ntt {
            ctx.inverse(&mut self.coeffs);
            self.is_ntt = false;
        }
    }

    /// Multiply every limb by the same integer scalar
    pub fn scalar_mul_assign(&mut self, scalar: u64) {
        let n = self.dimension();
        for (limb, &q) in self.coeffs.chunks_exact_mut(n).zip(&self.moduli) {
            let s = scalar % q;
            for c in limb.iter_mut() {
                *c = mul_mod(*c, s, q);
            }
        }
    }

    /// Multiply limb `i` by `scalars[i]`, for scalars already reduced per limb
    pub fn rns_scalar_mul_assign(&mut self, scalars: &[u64]) {
        assert!(scalars.len() >= self.limb_count(), "Missing per-limb scalars");
        let n = self.dimension();
        for ((limb, &q), &s) in self.coeffs.chunks_exact_mut(n).zip(&self.moduli).zip(scalars) {
            for c in limb.iter_mut() {
                *c = mul_mod(*c, s, q);
            }
        }
    }

    /// Product of two NTT-domain polynomials
    pub fn mul_ntt_domain(&self, other: &Self, ctx: &NttContext) -> Self {
        assert!(
            self.is_ntt && other.is_ntt,
            "Both polynomials must be in NTT domain"
        );
        assert_eq!(self.moduli, other.moduli, "Moduli must match");
        let mut result = vec![0u64; self.coeffs.len()];
        ctx.pointwise_mul(&self.coeffs, &other.coeffs, &mut result);
        Self {
            coeffs: result,
            moduli: self.moduli.clone(),
            is_ntt: true,
        }
    }

    /// In-place multiply-accumulate in NTT domain: `self += a * b`.
    ///
    /// `b` may live at a deeper level than `self`; its extra limbs are ignored.
    pub fn mul_acc_ntt_domain(&mut self, a: &Self, b: &Self, ctx: &NttContext) {
        assert!(
            self.is_ntt && a.is_ntt && b.is_ntt,
            "All polynomials must be in NTT domain"
        );
        assert_eq!(self.moduli, a.moduli, "Moduli must match");
        assert!(
            b.moduli.starts_with(&self.moduli),
            "Multiplier moduli must extend the accumulator's"
        );
        let len = self.coeffs.len();
        ctx.pointwise_mul_acc(&mut self.coeffs, &a.coeffs, &b.coeffs[..len]);
    }

    /// Remove and return the last limb, dropping one level
    pub fn drop_last_limb(&mut self) -> Vec<u64> {
        assert!(self.limb_count() > 1, "Cannot drop the only limb");
        let n = self.dimension();
        self.moduli.pop();
        self.coeffs.split_off(self.moduli.len() * n)
    }

    /// Copy of the first `limbs` limbs
    pub fn truncated(&self, limbs: usize) -> Self {
        assert!(limbs >= 1 && limbs <= self.limb_count(), "Invalid limb count");
        let n = self.dimension();
        Self {
            coeffs: self.coeffs[..limbs * n].to_vec(),
            moduli: self.moduli[..limbs].to_vec(),
            is_ntt: self.is_ntt,
        }
    }

    /// Whether the limb layout matches the moduli and every residue is reduced.
    /// Polynomials decoded from untrusted bytes are checked with this.
    pub fn is_well_formed(&self) -> bool {
        let limbs = self.moduli.len();
        if limbs == 0 || self.coeffs.is_empty() || self.coeffs.len() % limbs != 0 {
            return false;
        }
        let n = self.coeffs.len() / limbs;
        n.is_power_of_two()
            && self
                .coeffs
                .chunks_exact(n)
                .zip(&self.moduli)
                .all(|(limb, &q)| q > 1 && limb.iter().all(|&c| c < q))
    }

    /// Check if polynomial is zero
    pub fn is_zero(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0)
    }

    fn assert_compatible(&self, rhs: &Self) {
        assert_eq!(self.moduli, rhs.moduli, "Moduli must match");
        assert_eq!(self.is_ntt, rhs.is_ntt, "NTT domains must match");
        assert_eq!(self.coeffs.len(), rhs.coeffs.len(), "Dimensions must match");
    }

    fn zip_assign(&mut self, rhs: &Self, op: fn(u64, u64, u64) -> u64) {
        self.assert_compatible(rhs);
        let n = self.dimension();
        for ((limb, rhs_limb), &q) in self
            .coeffs
            .chunks_exact_mut(n)
            .zip(rhs.coeffs.chunks_exact(n))
            .zip(&self.moduli)
        {
            for (a, &b) in limb.iter_mut().zip(rhs_limb) {
                *a = op(*a, b, q);
            }
        }
    }
}

impl AddAssign<&Poly> for Poly {
    fn add_assign(&mut self, rhs: &Poly) {
        self.zip_assign(rhs, add_mod);
    }
}

impl SubAssign<&Poly> for Poly {
    fn sub_assign(&mut self, rhs: &Poly) {
        self.zip_assign(rhs, sub_mod);
    }
}

impl Add for &Poly {
    type Output = Poly;

    fn add(self, rhs: Self) -> Poly {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl Sub for &Poly {
    type Output = Poly;

    fn sub(self, rhs: Self) -> Poly {
        let mut out = self.clone();
        out -= rhs;
        out
    }
}

impl Neg for &Poly {
    type Output = Poly;

    fn neg(self) -> Poly {
        let mut out = self.clone();
        let n = out.dimension();
        for (limb, &q) in out.coeffs.chunks_exact_mut(n).zip(&self.moduli) {
            for c in limb.iter_mut() {
                *c = neg_mod(*c, q);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULI: [u64; 2] = [1152921504606844417, 1152921504606844289];

    fn ctx(n: usize) -> NttContext {
        NttContext::with_moduli(n, &MODULI)
    }

    #[test]
    fn test_from_signed_every_limb() {
        let p = Poly::from_signed(&[1, -1, 0, 5], &MODULI);
        assert_eq!(p.dimension(), 4);
        assert_eq!(p.limb(0), &[1, MODULI[0] - 1, 0, 5]);
        assert_eq!(p.limb(1), &[1, MODULI[1] - 1, 0, 5]);
    }

    #[test]
    fn test_add_sub_neg() {
        let a = Poly::from_signed(&[1, 2, 3, 4], &MODULI);
        let b = Poly::from_signed(&[5, -6, 7, -8], &MODULI);
        let sum = &a + &b;
        assert_eq!(sum, Poly::from_signed(&[6, -4, 10, -4], &MODULI));
        let diff = &sum - &b;
        assert_eq!(diff, a);
        assert!((&a + &(-&a)).is_zero());
    }

    #[test]
    fn test_ntt_product_negacyclic() {
        let n = 16;
        let ctx = ctx(n);
        let mut x = vec![0i64; n];
        x[1] = 1;
        let mut y = vec![0i64; n];
        y[n - 1] = 3;
        let mut a = Poly::from_signed(&x, &MODULI);
        let mut b = Poly::from_signed(&y, &MODULI);
        a.to_ntt(&ctx);
        b.to_ntt(&ctx);
        let mut prod = a.mul_ntt_domain(&b, &ctx);
        prod.from_ntt(&ctx);
        let mut expected = vec![0i64; n];
        expected[0] = -3;
        assert_eq!(prod, Poly::from_signed(&expected, &MODULI));
    }

    #[test]
    fn test_mul_acc_with_deeper_multiplier() {
        let n = 8;
        let ctx = ctx(n);
        let mut acc = Poly::zero(n, &MODULI[..1]);
        acc.to_ntt(&ctx);
        let mut a = Poly::from_signed(&[2; 8], &MODULI[..1]);
        let mut b = Poly::from_signed(&[1, 0, 0, 0, 0, 0, 0, 0], &MODULI);
        a.to_ntt(&ctx);
        b.to_ntt(&ctx);
        acc.mul_acc_ntt_domain(&a, &b, &ctx);
        acc.from_ntt(&ctx);
        assert_eq!(acc, Poly::from_signed(&[2; 8], &MODULI[..1]));
    }

    #[test]
    fn test_drop_last_limb() {
        let mut p = Poly::from_signed(&[7, 8], &MODULI);
        let last = p.drop_last_limb();
        assert_eq!(last, vec![7, 8]);
        assert_eq!(p.limb_count(), 1);
        assert_eq!(p.coeffs(), &[7, 8]);
    }

    #[test]
    #[should_panic(expected = "NTT domains must match")]
    fn test_domain_mismatch_panics() {
        let ctx = ctx(4);
        let a = Poly::from_signed(&[1, 2, 3, 4], &MODULI);
        let mut b = a.clone();
        b.to_ntt(&ctx);
        let _ = &a + &b;
    }
}
