//! Oblivious query expansion
//!
//! Turns one ciphertext encrypting `v·X^k` into `m` ciphertexts where the
//! `k`-th encrypts `v` (up to the expansion scaling) and every other one
//! encrypts zero.
//!
//! # Algorithm
//!
//! Binary doubling over `ceil(log2 m)` levels. At level `i` each ciphertext
//! `c` of the current list (size `2^i`) is rotated by the Galois element
//! `g_i = N/2^i + 1`, which fixes the coefficients whose index is a multiple
//! of `2^{i+1}` and negates the odd multiples of `2^i`:
//!
//! ```text
//! even = c + τ_g(c)                       keeps slots ≡ 0 (mod 2^{i+1})
//! odd  = X^{-2^i}·c + X^{-2^i·g}·τ_g(c)   shifts slots ≡ 2^i down and keeps them
//! ```
//!
//! Every surviving coefficient is doubled once per level, so outputs carry a
//! factor `2^{ceil(log2 m)}`. When `m` is not a power of two, the entries of
//! the last level whose odd half would fall past `m` are doubled with a
//! plaintext multiply instead, keeping the scaling uniform.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::level::LevelManager;
use crate::error::{config_err, Result};
use crate::math::modular::{inv_mod, pow_mod};
use crate::scheme::SchemeAdapter;

/// How the client scaled the selected coefficient
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionVariant {
    /// Selected coefficient pre-multiplied by `2^{-ceil(log2 m)} mod t`;
    /// outputs are returned as computed
    #[default]
    Direct,
    /// Raw per-slot value; outputs are multiplied by `2^{-ceil(log2 m)} mod t`
    Normalized,
}

/// `ceil(log2 m)` for `m ≥ 1`
pub fn expansion_depth(m: usize) -> u32 {
    m.next_power_of_two().trailing_zeros()
}

/// Galois elements needed to expand into `m` ciphertexts in a ring of degree `n`
pub fn expansion_galois_elements(n: usize, m: usize) -> Vec<usize> {
    (0..expansion_depth(m)).map(|i| (n >> i) + 1).collect()
}

/// `2^{-depth} mod t`, or `None` when `t` is even
pub fn expansion_scale_inverse(t: u64, depth: u32) -> Option<u64> {
    inv_mod(pow_mod(2, depth as u64, t), t)
}

/// Expands compact queries over a [`SchemeAdapter`]
pub struct QueryExpander<'a, S: SchemeAdapter> {
    levels: LevelManager<'a, S>,
    variant: ExpansionVariant,
}

impl<'a, S: SchemeAdapter> QueryExpander<'a, S> {
    pub fn new(levels: LevelManager<'a, S>, variant: ExpansionVariant) -> Self {
        Self { levels, variant }
    }

    pub fn variant(&self) -> ExpansionVariant {
        self.variant
    }

    /// Expand `query` into exactly `m` selection ciphertexts (coefficient domain).
    ///
    /// # Errors
    ///
    /// Configuration error when `m` is zero or exceeds the ring degree, when a
    /// required Galois key is missing, or when the normalized variant is
    /// requested with an even plaintext modulus.
    pub fn expand(&self, query: S::Ciphertext, m: usize) -> Result<Vec<S::Ciphertext>> {
        let scheme = self.levels.scheme();
        let n = scheme.ring_degree();
        if m == 0 {
            return Err(config_err!("cannot expand a query into zero ciphertexts"));
        }
        if m > n {
            return Err(config_err!(
                "expansion target {} exceeds the ring degree {}",
                m,
                n
            ));
        }
        let depth = expansion_depth(m);
        let normalizer = match self.variant {
            ExpansionVariant::Direct => None,
            ExpansionVariant::Normalized => {
                let inv = expansion_scale_inverse(scheme.plain_modulus(), depth).ok_or_else(|| {
                    config_err!(
                        "normalized expansion needs an odd plaintext modulus, got {}",
                        scheme.plain_modulus()
                    )
                })?;
                Some(scheme.encode_constant(inv))
            }
        };
        if let Some(g) = expansion_galois_elements(n, m)
            .into_iter()
            .find(|&g| !scheme.has_galois_key(g))
        {
            return Err(config_err!("missing Galois key for element {}", g));
        }

        debug!(m, depth, variant = ?self.variant, "expanding query");
        let mut cts = vec![self.levels.ensure_coeff(query)];
        let two = scheme.encode_constant(2);

        for i in 0..depth {
            let half = 1usize << i;
            let galois_elt = (n >> i) + 1;
            let shift = 2 * n - half;
            let rotated_shift = (shift * galois_elt) % (2 * n);
            // Entries at or past this index only need doubling on the last level
            let corner = if i + 1 == depth { m - half } else { half };

            let pairs: Vec<(S::Ciphertext, Option<S::Ciphertext>)> = cts
                .into_par_iter()
                .enumerate()
                .map(|(a, c)| {
                    if a >= corner {
                        let mut doubled = c;
                        scheme.multiply_plain_assign(&mut doubled, &two);
                        return (doubled, None);
                    }
                    let rotated = scheme.apply_galois(&c, galois_elt);
                    let mut odd = scheme.multiply_power_of_x(&c, shift);
                    scheme.add_assign(&mut odd, &scheme.multiply_power_of_x(&rotated, rotated_shift));
                    let mut even = c;
                    scheme.add_assign(&mut even, &rotated);
                    (even, Some(odd))
                })
                .collect();

            let (evens, odds): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
            cts = evens;
            cts.extend(odds.into_iter().flatten());
            trace!(level = i, len = cts.len(), "expansion level done");
        }
        cts.truncate(m);

        if let Some(normalizer) = normalizer {
            cts.par_iter_mut()
                .for_each(|ct| scheme.multiply_plain_assign(ct, &normalizer));
        }
        Ok(cts)
    }
}
