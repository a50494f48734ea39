//! Chain-level and transform-domain bookkeeping
//!
//! Every level or domain change made by the engine goes through
//! [`LevelManager`], which also owns the ciphertext ↔ plaintext
//! decomposition used between folding dimensions. Representation mismatches
//! caught here are programming errors and panic.

use std::borrow::Cow;

use crate::error::{config_err, Result};
use crate::math::modular::bit_length;
use crate::scheme::{Level, SchemeAdapter};

/// Level and domain scheduling over a [`SchemeAdapter`]
pub struct LevelManager<'a, S: SchemeAdapter> {
    scheme: &'a S,
}

impl<S: SchemeAdapter> Clone for LevelManager<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: SchemeAdapter> Copy for LevelManager<'_, S> {}

impl<'a, S: SchemeAdapter> LevelManager<'a, S> {
    pub fn new(scheme: &'a S) -> Self {
        Self { scheme }
    }

    /// Underlying scheme
    pub fn scheme(&self) -> &'a S {
        self.scheme
    }

    /// Level with chain index `idx`, clamped to the top of the chain
    pub fn level_for_chain_index(&self, idx: usize) -> Level {
        let top = self.scheme.top_level();
        if idx > top.chain_index() {
            top
        } else {
            Level::new(idx)
        }
    }

    /// Single-modulus level responses end at
    pub fn last_level(&self) -> Level {
        Level::LAST
    }

    /// Level of fresh ciphertexts
    pub fn top_level(&self) -> Level {
        self.scheme.top_level()
    }

    /// Switch `ct` down to `level`, keeping its domain.
    ///
    /// # Panics
    ///
    /// Panics if `level` is above the ciphertext's current level.
    pub fn mod_switch_to(&self, mut ct: S::Ciphertext, level: Level) -> S::Ciphertext {
        let current = self.scheme.level_of(&ct);
        assert!(
            level <= current,
            "Cannot switch a ciphertext up from {current} to {level}"
        );
        for _ in level.chain_index()..current.chain_index() {
            ct = self.scheme.mod_switch_to_next(ct);
        }
        ct
    }

    pub fn mod_switch_to_last(&self, ct: S::Ciphertext) -> S::Ciphertext {
        self.mod_switch_to(ct, Level::LAST)
    }

    /// NTT form of `ct`; no-op if already there
    pub fn ensure_ntt(&self, ct: S::Ciphertext) -> S::Ciphertext {
        if self.scheme.is_ntt(&ct) {
            ct
        } else {
            self.scheme.transform_to_ntt(ct)
        }
    }

    /// Coefficient form of `ct`; no-op if already there
    pub fn ensure_coeff(&self, ct: S::Ciphertext) -> S::Ciphertext {
        if self.scheme.is_ntt(&ct) {
            self.scheme.transform_from_ntt(ct)
        } else {
            ct
        }
    }

    /// Plaintext ready to multiply NTT ciphertexts at `level`: borrowed when
    /// already prepared for it, transformed otherwise.
    ///
    /// # Panics
    ///
    /// Panics if `pt` was transformed for a different level.
    pub fn plain_for<'p>(&self, pt: &'p S::Plaintext, level: Level) -> Cow<'p, S::Plaintext> {
        match self.scheme.plain_ntt_level(pt) {
            Some(have) if have == level => Cow::Borrowed(pt),
            Some(have) => panic!("Plaintext prepared for {have} cannot multiply at {level}"),
            None => Cow::Owned(self.scheme.transform_plain_to_ntt(pt, level)),
        }
    }

    /// Check that `ct` and `pt` can be multiplied.
    ///
    /// # Panics
    ///
    /// Panics on a domain or level mismatch.
    pub fn assert_plain_compatible(&self, ct: &S::Ciphertext, pt: &S::Plaintext) {
        match self.scheme.plain_ntt_level(pt) {
            Some(level) => {
                assert!(
                    self.scheme.is_ntt(ct),
                    "NTT plaintext used with a coefficient-domain ciphertext"
                );
                let ct_level = self.scheme.level_of(ct);
                assert_eq!(
                    ct_level, level,
                    "Plaintext prepared for {level} used with a ciphertext at {ct_level}"
                );
            }
            None => assert!(
                !self.scheme.is_ntt(ct),
                "Coefficient plaintext used with an NTT-domain ciphertext"
            ),
        }
    }

    /// `ct · pt` after checking compatibility
    pub fn multiply_plain(&self, mut ct: S::Ciphertext, pt: &S::Plaintext) -> S::Ciphertext {
        self.assert_plain_compatible(&ct, pt);
        self.scheme.multiply_plain_assign(&mut ct, pt);
        ct
    }

    /// Bits of ciphertext coefficient carried by each plaintext coefficient
    fn plain_bits(&self) -> u32 {
        bit_length(self.scheme.plain_modulus()) - 1
    }

    /// Plaintexts needed to carry one polynomial of a ciphertext at `level`:
    /// `Σ_{i ≤ l} ceil(bits(q_i) / floor(log2 t))`
    pub fn expansion_ratio(&self, level: Level) -> usize {
        let pt_bits = self.plain_bits();
        self.scheme
            .moduli_at(level)
            .iter()
            .map(|&q| bit_length(q).div_ceil(pt_bits) as usize)
            .sum()
    }

    /// Split the raw residues of a coefficient-domain ciphertext into
    /// `rank × expansion_ratio(level)` plaintexts.
    ///
    /// Order is polynomial-major, then modulus, then digit (least significant first).
    pub fn decompose(&self, ct: &S::Ciphertext) -> Vec<S::Plaintext> {
        assert!(
            !self.scheme.is_ntt(ct),
            "Decomposition requires a coefficient-domain ciphertext"
        );
        let level = self.scheme.level_of(ct);
        let moduli = self.scheme.moduli_at(level);
        let pt_bits = self.plain_bits();
        let mask = (1u64 << pt_bits) - 1;

        let limbs = self.scheme.ciphertext_limbs(ct);
        let mut out = Vec::with_capacity(self.scheme.rank(ct) * self.expansion_ratio(level));
        for (idx, limb) in limbs.iter().enumerate() {
            let q = moduli[idx % moduli.len()];
            for j in 0..bit_length(q).div_ceil(pt_bits) {
                let shift = pt_bits * j;
                let digits = limb.iter().map(|&v| (v >> shift) & mask).collect();
                out.push(self.scheme.plaintext_from_coeffs(digits));
            }
        }
        out
    }

    /// Rebuild a ciphertext of `rank` polynomials at `level` from the output
    /// of [`LevelManager::decompose`].
    pub fn compose(&self, pts: &[S::Plaintext], rank: usize, level: Level) -> Result<S::Ciphertext> {
        let ratio = self.expansion_ratio(level);
        if pts.len() != rank * ratio {
            return Err(config_err!(
                "expected {} plaintexts to compose a rank-{} ciphertext at {}, got {}",
                rank * ratio,
                rank,
                level,
                pts.len()
            ));
        }
        let moduli = self.scheme.moduli_at(level);
        let pt_bits = self.plain_bits();
        let mask = (1u64 << pt_bits) - 1;
        let n = self.scheme.ring_degree();

        let mut limbs = Vec::with_capacity(rank * moduli.len());
        let mut digits = pts.iter();
        for _ in 0..rank {
            for &q in moduli {
                let mut limb = vec![0u64; n];
                for j in 0..bit_length(q).div_ceil(pt_bits) {
                    let shift = pt_bits * j;
                    let pt = digits.next().ok_or_else(|| config_err!("ran out of digits"))?;
                    for (v, &d) in limb.iter_mut().zip(self.scheme.plaintext_coeffs(pt)) {
                        *v |= (d & mask) << shift;
                    }
                }
                limbs.push(limb);
            }
        }
        Ok(self.scheme.ciphertext_from_limbs(limbs, rank, level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn test_level_for_chain_index_clamps() {
        let f = Fixture::new(&[]);
        let levels = LevelManager::new(&f.eval);
        assert_eq!(levels.level_for_chain_index(0), Level::LAST);
        assert_eq!(levels.level_for_chain_index(2), Level::new(2));
        assert_eq!(levels.level_for_chain_index(40), levels.top_level());
    }

    #[test]
    fn test_expansion_ratio() {
        let f = Fixture::new(&[]);
        let levels = LevelManager::new(&f.eval);
        // 60-bit moduli, 8 plaintext bits per digit
        assert_eq!(levels.expansion_ratio(Level::LAST), 8);
        assert_eq!(levels.expansion_ratio(Level::new(3)), 32);
        assert_eq!(
            levels.expansion_ratio(Level::new(1)),
            levels.expansion_ratio(Level::new(1))
        );
    }

    #[test]
    fn test_decompose_compose_roundtrip_every_level() {
        let f = Fixture::new(&[]);
        let levels = LevelManager::new(&f.eval);
        for idx in 0..=3 {
            let level = Level::new(idx);
            let ct = levels.mod_switch_to(f.encrypt(&[9, 8, 7]), level);
            let pts = levels.decompose(&ct);
            assert_eq!(pts.len(), 2 * levels.expansion_ratio(level));
            assert!(pts
                .iter()
                .all(|pt| f.eval.plaintext_coeffs(pt).iter().all(|&d| d < 256)));
            let back = levels.compose(&pts, 2, level).unwrap();
            assert_eq!(back, ct);
        }
    }

    #[test]
    fn test_compose_rejects_wrong_count() {
        let f = Fixture::new(&[]);
        let levels = LevelManager::new(&f.eval);
        let ct = levels.mod_switch_to_last(f.encrypt(&[1]));
        let mut pts = levels.decompose(&ct);
        pts.pop();
        assert!(levels.compose(&pts, 2, Level::LAST).is_err());
    }

    #[test]
    fn test_domain_helpers_are_idempotent() {
        let f = Fixture::new(&[]);
        let levels = LevelManager::new(&f.eval);
        let ct = f.encrypt(&[3]);
        let ntt = levels.ensure_ntt(levels.ensure_ntt(ct.clone()));
        assert!(ntt.is_ntt());
        let back = levels.ensure_coeff(levels.ensure_coeff(ntt));
        assert_eq!(back, ct);
    }

    #[test]
    fn test_plain_for_borrows_prepared() {
        let f = Fixture::new(&[]);
        let levels = LevelManager::new(&f.eval);
        let pt = f.eval.plaintext_from_coeffs(vec![1, 2]);
        let level = Level::new(2);
        let prepared = levels.plain_for(&pt, level).into_owned();
        assert!(matches!(levels.plain_for(&prepared, level), Cow::Borrowed(_)));
    }

    #[test]
    #[should_panic(expected = "Cannot switch a ciphertext up")]
    fn test_switch_up_panics() {
        let f = Fixture::new(&[]);
        let levels = LevelManager::new(&f.eval);
        let ct = levels.mod_switch_to_last(f.encrypt(&[1]));
        let _ = levels.mod_switch_to(ct, Level::new(2));
    }

    #[test]
    #[should_panic(expected = "coefficient-domain ciphertext")]
    fn test_assert_plain_compatible_catches_domain() {
        let f = Fixture::new(&[]);
        let levels = LevelManager::new(&f.eval);
        let ct = f.encrypt(&[1]);
        let pt = levels.plain_for(&f.eval.encode_constant(1), levels.top_level()).into_owned();
        levels.assert_plain_compatible(&ct, &pt);
    }
}
