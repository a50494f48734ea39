//! Galois automorphisms and monomial shifts
//!
//! τ_g: R → R with τ_g(X) = X^g for odd g. For R = Z[X]/(X^N + 1) the
//! coefficient of X^i moves to X^(g·i mod 2N), negated when the exponent
//! lands in `[N, 2N)`.

use crate::math::modular::neg_mod;
use crate::math::Poly;

/// Destination slot and sign of `X^i` under `X -> X^g`
#[inline]
fn permuted_index(i: usize, g: usize, n: usize) -> (usize, bool) {
    let idx = (g * i) % (2 * n);
    if idx < n {
        (idx, false)
    } else {
        (idx - n, true)
    }
}

/// Apply τ_g to every limb of a coefficient-domain polynomial
pub fn apply_automorphism(poly: &Poly, g: usize) -> Poly {
    assert!(!poly.is_ntt(), "Automorphism requires coefficient domain");
    let n = poly.dimension();
    let mut result = Poly::zero(n, poly.moduli());

    for (limb_idx, (limb, q)) in poly.limbs().enumerate() {
        let out = result.limb_mut(limb_idx);
        for (i, &c) in limb.iter().enumerate() {
            let (j, negate) = permuted_index(i, g, n);
            out[j] = if negate { neg_mod(c, q) } else { c };
        }
    }
    result
}

/// Apply τ_g to a small signed polynomial (a secret key)
pub fn automorphism_signed(values: &[i64], g: usize) -> Vec<i64> {
    let n = values.len();
    let mut out = vec![0i64; n];
    for (i, &c) in values.iter().enumerate() {
        let (j, negate) = permuted_index(i, g, n);
        out[j] = if negate { -c } else { c };
    }
    out
}

/// Multiply a coefficient-domain polynomial by X^k for `k < 2N`
pub fn multiply_by_monomial(poly: &Poly, k: usize) -> Poly {
    assert!(!poly.is_ntt(), "Monomial shift requires coefficient domain");
    let n = poly.dimension();
    assert!(k < 2 * n, "Monomial exponent must be below 2N");
    let mut result = Poly::zero(n, poly.moduli());

    for (limb_idx, (limb, q)) in poly.limbs().enumerate() {
        let out = result.limb_mut(limb_idx);
        for (i, &c) in limb.iter().enumerate() {
            let shifted = (i + k) % (2 * n);
            if shifted < n {
                out[shifted] = c;
            } else {
                out[shifted - n] = neg_mod(c, q);
            }
        }
    }
    result
}

/// Check if g is a valid Galois element (odd and below 2N)
pub fn is_valid_galois_element(g: usize, n: usize) -> bool {
    g % 2 == 1 && g < 2 * n
}
