//! CRT composition over an RNS base.
//!
//! Word-sized residues are the working representation; whenever an exact
//! integer is required (tensor rounding, decryption, noise measurement) the
//! residues are composed into a `num_bigint` integer and reduced back.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, ToPrimitive, Zero};

use super::modular::inv_mod;

/// Precomputed CRT data for a set of pairwise coprime moduli.
#[derive(Clone, Debug)]
pub struct RnsBase {
    moduli: Vec<u64>,
    product: BigUint,
    half_product: BigUint,
    /// `Q / q_i`
    punctured: Vec<BigUint>,
    /// `(Q / q_i)^(-1) mod q_i`
    punctured_inv: Vec<u64>,
}

impl RnsBase {
    /// Build a base from pairwise coprime moduli
    ///
    /// # Panics
    ///
    /// Panics if two moduli share a factor.
    pub fn new(moduli: &[u64]) -> Self {
        assert!(!moduli.is_empty(), "moduli must be non-empty");
        let product = moduli
            .iter()
            .fold(BigUint::one(), |acc, &q| acc * BigUint::from(q));
        let punctured: Vec<BigUint> = moduli.iter().map(|&q| &product / q).collect();
        let punctured_inv = punctured
            .iter()
            .zip(moduli)
            .map(|(p, &q)| {
                let r = (p % q).to_u64().unwrap_or(0);
                inv_mod(r, q).unwrap_or_else(|| panic!("moduli must be pairwise coprime"))
            })
            .collect();
        let half_product = &product >> 1u32;

        Self {
            moduli: moduli.to_vec(),
            product,
            half_product,
            punctured,
            punctured_inv,
        }
    }

    /// Moduli of the base
    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    /// Product of all moduli
    pub fn product(&self) -> &BigUint {
        &self.product
    }

    /// Total bit length of the product
    pub fn bits(&self) -> u64 {
        self.product.bits()
    }

    /// Compose residues into the unique value in `[0, Q)`
    pub fn compose(&self, residues: &[u64]) -> BigUint {
        debug_assert_eq!(residues.len(), self.moduli.len());
        let mut acc = BigUint::zero();
        for (i, &r) in residues.iter().enumerate() {
            let q = self.moduli[i];
            let scaled = ((r as u128 * self.punctured_inv[i] as u128) % q as u128) as u64;
            acc += &self.punctured[i] * scaled;
        }
        acc % &self.product
    }

    /// Compose residues into the centered value in `(-Q/2, Q/2]`
    pub fn compose_centered(&self, residues: &[u64]) -> BigInt {
        let value = self.compose(residues);
        self.center(value)
    }

    /// Centered representative of a value in `[0, Q)`
    pub fn center(&self, value: BigUint) -> BigInt {
        if value > self.half_product {
            BigInt::from(value) - BigInt::from(self.product.clone())
        } else {
            BigInt::from(value)
        }
    }

    /// Reduce an arbitrary integer into each modulus of the base
    pub fn decompose(&self, value: &BigInt) -> Vec<u64> {
        self.moduli.iter().map(|&q| reduce_bigint(value, q)).collect()
    }
}

/// Reduce a signed big integer into `[0, q)`
pub fn reduce_bigint(value: &BigInt, q: u64) -> u64 {
    let r = (value.magnitude() % q).to_u64().unwrap_or(0);
    if value.sign() == Sign::Minus && r != 0 {
        q - r
    } else {
        r
    }
}

/// `round(num / den)` for a signed numerator and positive denominator, ties away from zero
pub fn round_div(num: &BigInt, den: &BigUint) -> BigInt {
    let half = den >> 1u32;
    let magnitude = (num.magnitude() + &half) / den;
    BigInt::from_biguint(
        if num.sign() == Sign::Minus {
            Sign::Minus
        } else {
            Sign::Plus
        },
        magnitude,
    )
}
