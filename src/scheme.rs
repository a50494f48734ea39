//! Interface between the retrieval engine and a leveled homomorphic scheme.
//!
//! The engine never touches ciphertext internals directly. Everything it
//! needs (arithmetic, level and domain changes, automorphisms, raw coefficient
//! access for decomposition) goes through [`SchemeAdapter`]. The crate ships
//! one implementation, [`crate::bfv::BfvEvaluator`].
//!
//! Level and domain preconditions are stated on each method. Violating them is
//! a programming error; implementations panic rather than return a wrong
//! ciphertext.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position on the modulus chain.
///
/// Level `l` keeps the moduli `q_0..=q_l` active. Level 0 is the last level,
/// with a single modulus; the top level keeps the whole chain. Modulus
/// switching moves a ciphertext from level `l` to `l - 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Level(usize);

impl Level {
    /// The last level of every chain.
    pub const LAST: Level = Level(0);

    /// Level with the given chain index.
    pub const fn new(chain_index: usize) -> Self {
        Self(chain_index)
    }

    /// Chain index of this level.
    pub const fn chain_index(self) -> usize {
        self.0
    }

    /// Number of moduli active at this level.
    pub const fn modulus_count(self) -> usize {
        self.0 + 1
    }

    /// Level reached by one modulus switch, if any.
    pub fn next(self) -> Option<Level> {
        self.0.checked_sub(1).map(Level)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Primitive operations of a leveled homomorphic scheme.
///
/// Ciphertexts carry three attributes the engine reasons about: chain level,
/// transform domain (NTT or coefficient) and rank (2 normally, 3 after an
/// unrelinearized product). Plaintexts are either coefficient vectors mod `t`
/// or NTT forms prepared for one specific level.
///
/// Implementations hold the evaluation keys and are shared immutably across
/// requests and worker threads.
pub trait SchemeAdapter: Sync {
    /// Ciphertext handle.
    type Ciphertext: Clone + Send + Sync + Serialize + DeserializeOwned;
    /// Plaintext handle.
    type Plaintext: Clone + Send + Sync + Serialize + DeserializeOwned;

    /// Ring degree N.
    fn ring_degree(&self) -> usize;

    /// Plaintext modulus t.
    fn plain_modulus(&self) -> u64;

    /// Deepest level, where fresh ciphertexts live.
    fn top_level(&self) -> Level;

    /// Moduli active at `level`, `q_0` first.
    fn moduli_at(&self, level: Level) -> &[u64];

    /// Level of a ciphertext.
    fn level_of(&self, ct: &Self::Ciphertext) -> Level;

    /// Whether a ciphertext is in NTT domain.
    fn is_ntt(&self, ct: &Self::Ciphertext) -> bool;

    /// Number of polynomials in a ciphertext.
    fn rank(&self, ct: &Self::Ciphertext) -> usize;

    /// Whether a ciphertext lives in this scheme's ring at a level of its
    /// modulus chain. Checked on ciphertexts received from clients.
    fn fits_chain(&self, ct: &Self::Ciphertext) -> bool;

    /// Level a plaintext was transformed for, `None` in coefficient form.
    fn plain_ntt_level(&self, pt: &Self::Plaintext) -> Option<Level>;

    /// `acc += other`. Same level, domain; ranks may differ.
    fn add_assign(&self, acc: &mut Self::Ciphertext, other: &Self::Ciphertext);

    /// `acc -= other`. Same level and domain.
    fn sub_assign(&self, acc: &mut Self::Ciphertext, other: &Self::Ciphertext);

    /// Unrelinearized product of two rank-2 ciphertexts at the same level.
    /// Returns a rank-3 ciphertext in coefficient domain.
    fn multiply(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Self::Ciphertext;

    /// Unrelinearized square, same contract as [`SchemeAdapter::multiply`].
    fn square(&self, a: &Self::Ciphertext) -> Self::Ciphertext;

    /// Reduce a rank-3 ciphertext back to rank 2 (coefficient domain).
    fn relinearize(&self, ct: Self::Ciphertext) -> Self::Ciphertext;

    /// `ct *= pt`. NTT-domain ciphertext with a plaintext prepared for its
    /// level, or coefficient-domain ciphertext with a coefficient plaintext.
    fn multiply_plain_assign(&self, ct: &mut Self::Ciphertext, pt: &Self::Plaintext);

    /// `ct += pt`. Coefficient-domain ciphertext, coefficient plaintext.
    fn add_plain_assign(&self, ct: &mut Self::Ciphertext, pt: &Self::Plaintext);

    /// Drop the last active modulus. Panics at level 0.
    fn mod_switch_to_next(&self, ct: Self::Ciphertext) -> Self::Ciphertext;

    /// Move a ciphertext into NTT domain.
    fn transform_to_ntt(&self, ct: Self::Ciphertext) -> Self::Ciphertext;

    /// Move a ciphertext into coefficient domain.
    fn transform_from_ntt(&self, ct: Self::Ciphertext) -> Self::Ciphertext;

    /// NTT form of a coefficient plaintext for multiplying ciphertexts at `level`.
    fn transform_plain_to_ntt(&self, pt: &Self::Plaintext, level: Level) -> Self::Plaintext;

    /// Apply the Galois automorphism `X -> X^galois_elt` and key-switch back
    /// to the original key. Coefficient domain, rank 2.
    fn apply_galois(&self, ct: &Self::Ciphertext, galois_elt: usize) -> Self::Ciphertext;

    /// Whether a key for `galois_elt` is loaded.
    fn has_galois_key(&self, galois_elt: usize) -> bool;

    /// Multiply by the monomial `X^k`, `k < 2N`. Coefficient domain.
    fn multiply_power_of_x(&self, ct: &Self::Ciphertext, k: usize) -> Self::Ciphertext;

    /// Constant plaintext `value mod t`.
    fn encode_constant(&self, value: u64) -> Self::Plaintext;

    /// Fresh public-key encryption of a coefficient plaintext at the top level.
    fn encrypt(&self, pt: &Self::Plaintext) -> Self::Ciphertext;

    /// Clear the `bits` least significant bits of every coefficient.
    /// Only valid at a single-modulus level, coefficient domain.
    fn zero_low_order_bits(&self, ct: &mut Self::Ciphertext, bits: u32);

    /// Raw residues of a coefficient-domain ciphertext: one slice per
    /// (polynomial, modulus) pair, polynomial-major.
    fn ciphertext_limbs<'a>(&self, ct: &'a Self::Ciphertext) -> Vec<&'a [u64]>;

    /// Inverse of [`SchemeAdapter::ciphertext_limbs`]: rebuild a
    /// coefficient-domain ciphertext of `rank` polynomials at `level`.
    fn ciphertext_from_limbs(&self, limbs: Vec<Vec<u64>>, rank: usize, level: Level) -> Self::Ciphertext;

    /// Coefficient plaintext from values in `[0, t)`.
    fn plaintext_from_coeffs(&self, coeffs: Vec<u64>) -> Self::Plaintext;

    /// Coefficients of a coefficient-form plaintext. Panics on NTT forms.
    fn plaintext_coeffs<'a>(&self, pt: &'a Self::Plaintext) -> &'a [u64];
}
