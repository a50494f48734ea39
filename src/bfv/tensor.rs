//! Ciphertext tensor product with exact `t/Q` rounding
//!
//! BFV multiplication needs `round(t/Q · (c ⊗ d))` over the integers, not
//! modulo Q. Both operands are lifted (centered) into an auxiliary base of
//! 61-bit NTT primes large enough to hold the integer product, multiplied
//! there, then each coefficient is composed, scaled and rounded with
//! `num-bigint` and reduced back into the moduli of the operands' level.

use num_bigint::BigUint;

use super::context::BfvContext;
use super::encrypt::residues_per_coeff;
use super::types::Ciphertext;
use crate::math::rns::{reduce_bigint, round_div};
use crate::math::Poly;
use crate::scheme::Level;

/// Unrelinearized product. `rhs = None` squares `lhs`.
pub(crate) fn tensor(ctx: &BfvContext, lhs: &Ciphertext, rhs: Option<&Ciphertext>) -> Ciphertext {
    assert_eq!(lhs.rank(), 2, "Multiplication operands must have rank 2");
    assert!(!lhs.is_ntt(), "Multiplication operands must be in coefficient domain");
    let level = lhs.level();
    if let Some(rhs) = rhs {
        assert_eq!(rhs.rank(), 2, "Multiplication operands must have rank 2");
        assert!(!rhs.is_ntt(), "Multiplication operands must be in coefficient domain");
        assert_eq!(rhs.level(), level, "Multiplication operands must share a level");
    }

    let aux = ctx.aux_ntt();
    let a0 = lift_to_aux(ctx, &lhs.polys()[0]);
    let a1 = lift_to_aux(ctx, &lhs.polys()[1]);

    let (d0, d1, d2) = match rhs {
        Some(rhs) => {
            let b0 = lift_to_aux(ctx, &rhs.polys()[0]);
            let b1 = lift_to_aux(ctx, &rhs.polys()[1]);
            let d0 = a0.mul_ntt_domain(&b0, aux);
            let mut d1 = a0.mul_ntt_domain(&b1, aux);
            d1.mul_acc_ntt_domain(&a1, &b0, aux);
            let d2 = a1.mul_ntt_domain(&b1, aux);
            (d0, d1, d2)
        }
        None => {
            let d0 = a0.mul_ntt_domain(&a0, aux);
            let mut d1 = a0.mul_ntt_domain(&a1, aux);
            d1.scalar_mul_assign(2);
            let d2 = a1.mul_ntt_domain(&a1, aux);
            (d0, d1, d2)
        }
    };

    let moduli = lhs.moduli();
    let polys = [d0, d1, d2]
        .into_iter()
        .map(|mut d| {
            d.from_ntt(aux);
            scale_down(ctx, &d, moduli)
        })
        .collect();
    Ciphertext::from_polys(polys)
}

/// Centered lift of a level polynomial into the auxiliary base, NTT form
fn lift_to_aux(ctx: &BfvContext, poly: &Poly) -> Poly {
    let level_base = ctx.base_at(Level::new(poly.limb_count() - 1));
    let aux_base = ctx.aux_base();
    let n = poly.dimension();
    let aux_moduli = aux_base.moduli();

    let mut lifted = Poly::zero(n, aux_moduli);
    for (k, residues) in residues_per_coeff(poly).enumerate() {
        let value = level_base.compose_centered(&residues);
        for (i, r) in aux_base.decompose(&value).into_iter().enumerate() {
            lifted.limb_mut(i)[k] = r;
        }
    }
    lifted.to_ntt(ctx.aux_ntt());
    lifted
}

/// `round(t · V / Q)` reduced into `moduli`, with `V` the centered auxiliary value
fn scale_down(ctx: &BfvContext, poly: &Poly, moduli: &[u64]) -> Poly {
    let level = Level::new(moduli.len() - 1);
    let q: &BigUint = ctx.base_at(level).product();
    let t = ctx.plain_modulus();
    let aux_base = ctx.aux_base();
    let n = poly.dimension();

    let mut out = Poly::zero(n, moduli);
    for (k, residues) in residues_per_coeff(poly).enumerate() {
        let value = aux_base.compose_centered(&residues) * t;
        let rounded = round_div(&value, q);
        for (i, &qi) in moduli.iter().enumerate() {
            out.limb_mut(i)[k] = reduce_bigint(&rounded, qi);
        }
    }
    out
}
