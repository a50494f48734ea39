//! Number-Theoretic Transform over an RNS modulus chain.
//!
//! Negacyclic NTT for R_q = Z_q[X]/(X^n + 1), one table set per prime of the
//! chain. Limbs are stored back to back (`limb * n + coeff`), and every
//! transform operates on a prefix of the chain: a polynomial with `k` limbs is
//! transformed with the first `k` table sets. This is what lets one context
//! serve every level of a modulus chain.
//!
//! Values in the NTT domain are kept in Montgomery form (`a·2^64 mod q`).
//! Additions, subtractions and multiplication by a plain scalar are unaffected
//! by the Montgomery factor; products of two NTT-domain values go through
//! [`NttContext::pointwise_mul`] or [`NttContext::pointwise_mul_acc`].
//!
//! # Example
//!
//! ```
//! use hepir::math::ntt::NttContext;
//!
//! let q = 1152921504606844417;
//! let ctx = NttContext::with_moduli(64, &[q]);
//!
//! let mut coeffs: Vec<u64> = (0..64).collect();
//! ctx.forward(&mut coeffs);
//! ctx.inverse(&mut coeffs);
//! assert_eq!(coeffs[5], 5);
//! ```

use super::modular::pow_mod;

/// Precomputed tables for a single NTT-friendly prime.
#[derive(Clone, Debug)]
struct NttTables {
    q: u64,
    /// -q^(-1) mod 2^64
    q_inv_neg: u64,
    /// 2^128 mod q
    r_squared: u64,
    /// Forward twiddles, `psi_powers[m + i]` used at butterfly group `i` of stage `m`
    psi_powers: Vec<u64>,
    /// Inverse twiddles with the same layout
    psi_inv_powers: Vec<u64>,
    /// n^(-1) in Montgomery form
    n_inv: u64,
}

impl NttTables {
    fn new(n: usize, q: u64) -> Self {
        assert!(q % (2 * n as u64) == 1, "q must be ≡ 1 (mod 2n)");
        assert!(q < (1u64 << 62), "q must be below 2^62 for Montgomery reduction");

        let q_inv_neg = compute_q_inv_neg(q);
        let r_squared = compute_r_squared(q);

        let mut tables = Self {
            q,
            q_inv_neg,
            r_squared,
            psi_powers: Vec::new(),
            psi_inv_powers: Vec::new(),
            n_inv: 0,
        };

        let psi = find_primitive_root(2 * n as u64, q);
        let psi_inv = pow_mod(psi, q - 2, q);
        tables.psi_powers = tables.twiddles(n, tables.to_mont(psi));
        tables.psi_inv_powers = tables.twiddles(n, tables.to_mont(psi_inv));
        tables.n_inv = tables.to_mont(pow_mod(n as u64, q - 2, q));
        tables
    }

    #[inline]
    fn mont_mul(&self, a: u64, b: u64) -> u64 {
        let ab = (a as u128) * (b as u128);
        let m = ((ab as u64).wrapping_mul(self.q_inv_neg)) as u128;
        let t = ((ab + m * (self.q as u128)) >> 64) as u64;
        if t >= self.q {
            t - self.q
        } else {
            t
        }
    }

    #[inline]
    fn to_mont(&self, a: u64) -> u64 {
        self.mont_mul(a, self.r_squared)
    }

    #[inline]
    fn from_mont(&self, a: u64) -> u64 {
        self.mont_mul(a, 1)
    }

    /// Twiddles in the order the butterflies consume them.
    ///
    /// Slot `m` (a power of two) holds ψ^(n/(2m)); other slots are products of
    /// the slots for their highest and lowest set bits.
    fn twiddles(&self, n: usize, psi_mont: u64) -> Vec<u64> {
        let mut factors = vec![0u64; n];
        if n > 1 {
            factors[1] = self.to_mont(1);
        }
        for m in 1..n {
            if m.is_power_of_two() {
                let mut pow = self.to_mont(1);
                for _ in 0..n / (2 * m) {
                    pow = self.mont_mul(pow, psi_mont);
                }
                factors[m] = pow;
            } else {
                let high = m & (m - 1);
                let low = m & m.wrapping_neg();
                factors[m] = self.mont_mul(factors[high], factors[low]);
            }
        }
        factors
    }

    fn forward(&self, a: &mut [u64]) {
        let n = a.len();
        let q = self.q;
        for c in a.iter_mut() {
            *c = self.to_mont(*c);
        }

        let mut t = n;
        let mut m = 1;
        while m < n {
            t >>= 1;
            for i in 0..m {
                let j1 = 2 * i * t;
                let w = self.psi_powers[m + i];
                for j in j1..j1 + t {
                    let u = a[j];
                    let v = self.mont_mul(a[j + t], w);
                    a[j] = if u + v >= q { u + v - q } else { u + v };
                    a[j + t] = if u >= v { u - v } else { q - v + u };
                }
            }
            m <<= 1;
        }
    }

    fn inverse(&self, a: &mut [u64]) {
        let n = a.len();
        let q = self.q;

        let mut t = 1;
        let mut m = n;
        while m > 1 {
            m >>= 1;
            for i in 0..m {
                let j1 = 2 * i * t;
                let w = self.psi_inv_powers[m + i];
                for j in j1..j1 + t {
                    let u = a[j];
                    let v = a[j + t];
                    a[j] = if u + v >= q { u + v - q } else { u + v };
                    let diff = if u >= v { u - v } else { q - v + u };
                    a[j + t] = self.mont_mul(diff, w);
                }
            }
            t <<= 1;
        }

        for c in a.iter_mut() {
            *c = self.from_mont(self.mont_mul(*c, self.n_inv));
        }
    }
}

/// Precomputed NTT context for a chain of CRT moduli.
///
/// Create once per parameter set and share; all methods take `&self`.
#[derive(Clone, Debug)]
pub struct NttContext {
    n: usize,
    tables: Vec<NttTables>,
}

impl NttContext {
    /// Creates an NTT context for a single modulus.
    pub fn new(n: usize, q: u64) -> Self {
        Self::with_moduli(n, &[q])
    }

    /// Creates an NTT context for multiple CRT moduli.
    ///
    /// # Panics
    ///
    /// Panics if `n` is not a power of two, if `moduli` is empty, or if any
    /// modulus is not ≡ 1 (mod 2n).
    pub fn with_moduli(n: usize, moduli: &[u64]) -> Self {
        assert!(n.is_power_of_two(), "n must be a power of two");
        assert!(!moduli.is_empty(), "moduli must be non-empty");
        let tables = moduli.iter().map(|&q| NttTables::new(n, q)).collect();
        Self { n, tables }
    }

    /// Ring dimension.
    pub fn dimension(&self) -> usize {
        self.n
    }

    /// Number of CRT moduli the context covers.
    pub fn crt_count(&self) -> usize {
        self.tables.len()
    }

    /// The `idx`-th modulus.
    pub fn modulus_at(&self, idx: usize) -> u64 {
        self.tables[idx].q
    }

    fn limbs_of(&self, len: usize) -> usize {
        assert!(
            len % self.n == 0 && len / self.n <= self.crt_count(),
            "Input length must be a multiple of the dimension covering at most crt_count limbs"
        );
        len / self.n
    }

    /// Forward NTT in place on every limb present in `coeffs`.
    ///
    /// Output is in Montgomery form.
    pub fn forward(&self, coeffs: &mut [u64]) {
        let limbs = self.limbs_of(coeffs.len());
        for (idx, limb) in coeffs.chunks_exact_mut(self.n).enumerate().take(limbs) {
            self.tables[idx].forward(limb);
        }
    }

    /// Inverse NTT in place on every limb present in `coeffs`.
    ///
    /// Input must come from [`NttContext::forward`] (Montgomery form).
    pub fn inverse(&self, coeffs: &mut [u64]) {
        let limbs = self.limbs_of(coeffs.len());
        for (idx, limb) in coeffs.chunks_exact_mut(self.n).enumerate().take(limbs) {
            self.tables[idx].inverse(limb);
        }
    }

    /// Forward NTT of a single limb against the `idx`-th modulus.
    pub fn forward_limb(&self, limb: &mut [u64], idx: usize) {
        assert_eq!(limb.len(), self.n, "Limb length must match dimension");
        self.tables[idx].forward(limb);
    }

    /// Inverse NTT of a single limb against the `idx`-th modulus.
    pub fn inverse_limb(&self, limb: &mut [u64], idx: usize) {
        assert_eq!(limb.len(), self.n, "Limb length must match dimension");
        self.tables[idx].inverse(limb);
    }

    /// Pointwise product of two NTT-domain vectors: `result = a ⊙ b`.
    pub fn pointwise_mul(&self, a: &[u64], b: &[u64], result: &mut [u64]) {
        assert_eq!(a.len(), b.len(), "Operand lengths must match");
        assert_eq!(a.len(), result.len(), "Output length must match");
        let limbs = self.limbs_of(a.len());
        for idx in 0..limbs {
            let table = &self.tables[idx];
            let range = idx * self.n..(idx + 1) * self.n;
            for ((r, &x), &y) in result[range.clone()]
                .iter_mut()
                .zip(&a[range.clone()])
                .zip(&b[range])
            {
                *r = table.mont_mul(x, y);
            }
        }
    }

    /// Fused multiply-accumulate in the NTT domain: `acc += a ⊙ b`.
    ///
    /// `b` may carry more limbs than `acc`; only the leading limbs are read.
    pub fn pointwise_mul_acc(&self, acc: &mut [u64], a: &[u64], b: &[u64]) {
        assert_eq!(acc.len(), a.len(), "Operand lengths must match");
        assert!(b.len() >= acc.len(), "Multiplier has fewer limbs than accumulator");
        let limbs = self.limbs_of(acc.len());
        for idx in 0..limbs {
            let table = &self.tables[idx];
            let q = table.q;
            let range = idx * self.n..(idx + 1) * self.n;
            for ((r, &x), &y) in acc[range.clone()]
                .iter_mut()
                .zip(&a[range.clone()])
                .zip(&b[range])
            {
                let sum = *r + table.mont_mul(x, y);
                *r = if sum >= q { sum - q } else { sum };
            }
        }
    }
}

fn compute_q_inv_neg(q: u64) -> u64 {
    // Newton iteration on the 2-adic inverse, doubling correct bits each step
    let mut y: u64 = 1;
    for _ in 0..6 {
        y = y.wrapping_mul(2u64.wrapping_sub(q.wrapping_mul(y)));
    }
    y.wrapping_neg()
}

fn compute_r_squared(q: u64) -> u64 {
    let r_mod_q = (1u128 << 64) % (q as u128);
    ((r_mod_q * r_mod_q) % (q as u128)) as u64
}

/// Find a primitive `order`-th root of unity modulo q.
fn find_primitive_root(order: u64, q: u64) -> u64 {
    let exp = (q - 1) / order;
    for g in 2..q {
        let candidate = pow_mod(g, exp, q);
        if pow_mod(candidate, order / 2, q) != 1 {
            return candidate;
        }
    }
    panic!("no primitive root found for q = {}", q);
}

#[cfg(test)]
mod tests {
    use super::*;

    const Q0: u64 = 1152921504606844417;
    const Q1: u64 = 1152921504606844289;

    fn negacyclic_schoolbook(a: &[u64], b: &[u64], q: u64) -> Vec<u64> {
        let n = a.len();
        let mut out = vec![0u64; n];
        for i in 0..n {
            for j in 0..n {
                let prod = ((a[i] as u128 * b[j] as u128) % q as u128) as u64;
                let k = i + j;
                if k < n {
                    out[k] = (out[k] + prod) % q;
                } else {
                    out[k - n] = (out[k - n] + q - prod) % q;
                }
            }
        }
        out
    }

    #[test]
    fn test_q_inv_neg() {
        for q in [Q0, Q1, 257] {
            assert_eq!(q.wrapping_mul(compute_q_inv_neg(q)), u64::MAX);
        }
    }

    #[test]
    fn test_roundtrip_two_limbs() {
        let n = 64;
        let ctx = NttContext::with_moduli(n, &[Q0, Q1]);
        let original: Vec<u64> = (0..2 * n as u64).map(|i| i * 977 + 3).collect();
        let mut coeffs = original.clone();
        ctx.forward(&mut coeffs);
        assert_ne!(coeffs, original);
        ctx.inverse(&mut coeffs);
        assert_eq!(coeffs, original);
    }

    #[test]
    fn test_prefix_transform() {
        // A one-limb polynomial uses only the first table set
        let n = 32;
        let full = NttContext::with_moduli(n, &[Q0, Q1]);
        let single = NttContext::new(n, Q0);
        let mut a: Vec<u64> = (0..n as u64).collect();
        let mut b = a.clone();
        full.forward(&mut a);
        single.forward(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_negacyclic_product_matches_schoolbook() {
        let n = 16;
        let ctx = NttContext::new(n, Q0);
        let a: Vec<u64> = (0..n as u64).map(|i| (i * 31 + 7) % Q0).collect();
        let b: Vec<u64> = (0..n as u64).map(|i| Q0 - 1 - i * 5).collect();
        let expected = negacyclic_schoolbook(&a, &b, Q0);

        let mut a_ntt = a.clone();
        let mut b_ntt = b.clone();
        ctx.forward(&mut a_ntt);
        ctx.forward(&mut b_ntt);
        let mut prod = vec![0u64; n];
        ctx.pointwise_mul(&a_ntt, &b_ntt, &mut prod);
        ctx.inverse(&mut prod);
        assert_eq!(prod, expected);
    }

    #[test]
    fn test_x_times_x_pow_n_minus_one() {
        let n = 64;
        let ctx = NttContext::new(n, Q1);
        let mut a = vec![0u64; n];
        let mut b = vec![0u64; n];
        a[1] = 1;
        b[n - 1] = 1;
        ctx.forward(&mut a);
        ctx.forward(&mut b);
        let mut acc = vec![0u64; n];
        ctx.pointwise_mul_acc(&mut acc, &a, &b);
        ctx.pointwise_mul_acc(&mut acc, &a, &b);
        ctx.inverse(&mut acc);
        // 2 · X^n = -2
        assert_eq!(acc[0], Q1 - 2);
        assert!(acc[1..].iter().all(|&c| c == 0));
    }
}
