//! Encrypted polynomial evaluation
//!
//! Evaluates `P(x) = Σ_{i=0}^{D} coeff[i] · x^i` from the powers produced by
//! [`PowerGenerator`](super::powers::PowerGenerator) and `D + 1` coefficient
//! plaintexts.
//!
//! # Paterson–Stockmeyer split
//!
//! With block size `B = L + 1` the polynomial is rewritten as
//!
//! ```text
//! P(x) = Σ_b x^{bB} · (coeff[bB] + Σ_{j=1}^{L} coeff[bB + j] · x^j)
//! ```
//!
//! The inner sums only need the low powers (NTT, low level) and plaintext
//! products. Each block `b ≥ 1` costs one ciphertext product with the high
//! power `x^{bB}`, and the rank-3 products are summed before a single
//! relinearization. Block 0 has no high factor and is added last.

use rayon::prelude::*;
use tracing::debug;

use super::level::LevelManager;
use super::powers::{PowerLevels, PowerMode};
use crate::error::{config_err, Result};
use crate::math::modular::bit_length;
use crate::scheme::{Level, SchemeAdapter};

/// Extra low-order bits kept on top of what the plaintext and ring need
const LOW_BITS_MARGIN: u32 = 12;

/// Evaluates a plaintext-coefficient polynomial on encrypted powers
pub struct PolynomialMatcher<'a, S: SchemeAdapter> {
    levels: LevelManager<'a, S>,
    mode: PowerMode,
    power_levels: PowerLevels,
}

impl<'a, S: SchemeAdapter> PolynomialMatcher<'a, S> {
    /// `mode` and `power_levels` must be those the powers were generated with
    pub fn new(levels: LevelManager<'a, S>, mode: PowerMode, power_levels: PowerLevels) -> Self {
        Self {
            levels,
            mode,
            power_levels,
        }
    }

    /// Evaluate the polynomial.
    ///
    /// `coeffs` holds `D + 1` coefficient-form plaintexts and `powers[p - 1]`
    /// holds `x^p`. The result is a rank-2 ciphertext at the last level.
    ///
    /// # Errors
    ///
    /// Configuration error when the coefficient and power counts disagree or
    /// when the power levels are inverted.
    pub fn evaluate(&self, coeffs: &[S::Plaintext], powers: Vec<S::Ciphertext>) -> Result<S::Ciphertext> {
        if coeffs.len() != powers.len() + 1 {
            return Err(config_err!(
                "expected {} coefficients for {} powers, got {}",
                powers.len() + 1,
                powers.len(),
                coeffs.len()
            ));
        }
        let degree = powers.len();
        let scheme = self.levels.scheme();

        let result = if degree == 0 {
            debug!("degree 0, encrypting the constant term");
            scheme.encrypt(&coeffs[0])
        } else {
            match self.mode {
                PowerMode::Plain => self.evaluate_naive(coeffs, &powers),
                PowerMode::PatersonStockmeyer { low_degree } => {
                    self.evaluate_ps(coeffs, &powers, low_degree)?
                }
            }
        };
        Ok(self.finalize(result))
    }

    /// `Σ coeff[i]·x^i` in NTT, then `coeff[0]` in coefficient domain
    fn evaluate_naive(&self, coeffs: &[S::Plaintext], powers: &[S::Ciphertext]) -> S::Ciphertext {
        let scheme = self.levels.scheme();
        debug!(degree = powers.len(), "naive polynomial evaluation");
        let mut acc = self.inner_sum(coeffs, powers, 1, powers.len());
        acc = self.levels.ensure_coeff(acc);
        scheme.add_plain_assign(&mut acc, &coeffs[0]);
        acc
    }

    fn evaluate_ps(
        &self,
        coeffs: &[S::Plaintext],
        powers: &[S::Ciphertext],
        low_degree: usize,
    ) -> Result<S::Ciphertext> {
        let scheme = self.levels.scheme();
        let degree = powers.len();
        if low_degree == 0 || low_degree >= degree {
            return Err(config_err!(
                "low degree {} must lie in 1..{}",
                low_degree,
                degree
            ));
        }
        let (_, high) = self.power_levels.resolve(&self.levels)?;
        let block = low_degree + 1;
        let blocks = degree / block;
        debug!(degree, low_degree, blocks, "Paterson-Stockmeyer evaluation");

        let products: Vec<S::Ciphertext> = (1..=blocks)
            .into_par_iter()
            .map(|b| {
                let base = b * block;
                let mut inner = self.levels.ensure_coeff(self.inner_sum(
                    coeffs,
                    powers,
                    base + 1,
                    low_degree,
                ));
                scheme.add_plain_assign(&mut inner, &coeffs[base]);
                let inner = self.levels.mod_switch_to(inner, high);
                let high_power = self
                    .levels
                    .mod_switch_to(self.levels.ensure_coeff(powers[base - 1].clone()), high);
                scheme.multiply(&inner, &high_power)
            })
            .collect();

        let mut products = products.into_iter();
        let mut acc = products
            .next()
            .ok_or_else(|| config_err!("degree {} has no high block", degree))?;
        for product in products {
            scheme.add_assign(&mut acc, &product);
        }
        let mut acc = scheme.relinearize(acc);

        let mut head = self.levels.ensure_coeff(self.inner_sum(coeffs, powers, 1, low_degree));
        scheme.add_plain_assign(&mut head, &coeffs[0]);
        let head = self.levels.mod_switch_to(head, high);
        scheme.add_assign(&mut acc, &head);
        Ok(acc)
    }

    /// `Σ_{j=1}^{count} coeff[start + j - 1] · x^j` over the low powers, NTT
    /// domain. Coefficients past the degree count as zero.
    fn inner_sum(
        &self,
        coeffs: &[S::Plaintext],
        powers: &[S::Ciphertext],
        start: usize,
        count: usize,
    ) -> S::Ciphertext {
        assert!(count > 0, "Inner sum over zero powers");
        let scheme = self.levels.scheme();
        let zero = scheme.encode_constant(0);
        let mut acc: Option<S::Ciphertext> = None;
        for j in 1..=count {
            let pt = coeffs.get(start + j - 1).unwrap_or(&zero);
            let power = &powers[j - 1];
            let level = scheme.level_of(power);
            let term = self
                .levels
                .multiply_plain(power.clone(), &self.levels.plain_for(pt, level));
            match acc.as_mut() {
                Some(acc) => scheme.add_assign(acc, &term),
                None => acc = Some(term),
            }
        }
        acc.unwrap_or_else(|| unreachable!())
    }

    /// Shrink the response: last level, then drop the low-order bits the
    /// message does not need
    fn finalize(&self, ct: S::Ciphertext) -> S::Ciphertext {
        let scheme = self.levels.scheme();
        let mut ct = self
            .levels
            .ensure_coeff(self.levels.mod_switch_to_last(ct));
        let q0 = scheme.moduli_at(Level::LAST)[0];
        let log_n = scheme.ring_degree().trailing_zeros();
        let bits = bit_length(q0)
            .saturating_sub(bit_length(scheme.plain_modulus()))
            .saturating_sub(log_n)
            .saturating_sub(LOW_BITS_MARGIN);
        if bits > 0 {
            scheme.zero_low_order_bits(&mut ct, bits);
        }
        assert_eq!(scheme.rank(&ct), 2, "Matching result must have rank 2");
        ct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bfv::{Ciphertext, Plaintext};
    use crate::engine::powers::{PowerDag, PowerGenerator};
    use crate::error::Error;
    use crate::math::modular::pow_mod;
    use crate::testing::Fixture;

    const T: u64 = 257;

    fn coefficient_plaintexts(f: &Fixture, degree: usize) -> Vec<Plaintext> {
        (0..=degree)
            .map(|i| {
                let coeffs = (0..4).map(|k| (31 * i as u64 + 7 * k + 1) % T).collect();
                f.eval.plaintext_from_coeffs(coeffs)
            })
            .collect()
    }

    fn expected(f: &Fixture, coeffs: &[Plaintext], x: u64) -> Vec<u64> {
        let mut out = vec![0u64; f.eval.ring_degree()];
        for (i, pt) in coeffs.iter().enumerate() {
            let xi = pow_mod(x, i as u64, T);
            for (o, &c) in out.iter_mut().zip(f.eval.plaintext_coeffs(pt)) {
                *o = (*o + c * xi) % T;
            }
        }
        out
    }

    fn evaluate(f: &Fixture, mode: PowerMode, degree: usize, x: u64, coeffs: &[Plaintext]) -> Ciphertext {
        let dag = PowerDag::from_sources(degree, &[1]).unwrap();
        let sources = vec![(1, f.encrypt(&[x]))];
        let levels = LevelManager::new(&f.eval);
        let powers = PowerGenerator::new(levels, &dag, mode, PowerLevels::default())
            .generate(sources)
            .unwrap();
        PolynomialMatcher::new(levels, mode, PowerLevels::default())
            .evaluate(coeffs, powers)
            .unwrap()
    }

    #[test]
    fn test_naive_evaluation() {
        let f = Fixture::new(&[]);
        let coeffs = coefficient_plaintexts(&f, 5);
        let ct = evaluate(&f, PowerMode::Plain, 5, 3, &coeffs);
        assert_eq!(ct.level(), Level::LAST);
        assert_eq!(ct.rank(), 2);
        assert_eq!(f.decrypt(&ct), expected(&f, &coeffs, 3));
        assert!(f.noise_budget(&ct) > 0);
    }

    #[test]
    fn test_paterson_stockmeyer_matches_naive() {
        let f = Fixture::new(&[]);
        // D = 7, L = 2: two high blocks, the last one partially filled
        let coeffs = coefficient_plaintexts(&f, 7);
        let naive = evaluate(&f, PowerMode::Plain, 7, 11, &coeffs);
        let ps = evaluate(&f, PowerMode::PatersonStockmeyer { low_degree: 2 }, 7, 11, &coeffs);
        assert_eq!(f.decrypt(&ps), expected(&f, &coeffs, 11));
        assert_eq!(f.decrypt(&ps), f.decrypt(&naive));
        assert_eq!(ps.rank(), 2);
        assert_eq!(ps.level(), Level::LAST);
    }

    #[test]
    fn test_paterson_stockmeyer_exact_blocks() {
        let f = Fixture::new(&[]);
        // D = 6, L = 1: blocks of two, x^6 is the last high power
        let coeffs = coefficient_plaintexts(&f, 6);
        let ps = evaluate(&f, PowerMode::PatersonStockmeyer { low_degree: 1 }, 6, 200, &coeffs);
        assert_eq!(f.decrypt(&ps), expected(&f, &coeffs, 200));
    }

    #[test]
    fn test_degree_zero_encrypts_constant() {
        let f = Fixture::new(&[]);
        let coeffs = vec![f.eval.plaintext_from_coeffs(vec![42, 1])];
        for mode in [PowerMode::Plain, PowerMode::PatersonStockmeyer { low_degree: 3 }] {
            let matcher = PolynomialMatcher::new(
                LevelManager::new(&f.eval),
                mode,
                PowerLevels::default(),
            );
            let ct = matcher.evaluate(&coeffs, Vec::new()).unwrap();
            assert_eq!(ct.level(), Level::LAST);
            assert_eq!(ct.rank(), 2);
            assert_eq!(f.decrypt(&ct), f.padded(&[42, 1]), "{mode:?}");
        }
    }

    #[test]
    fn test_coefficient_count_mismatch() {
        let f = Fixture::new(&[]);
        let matcher = PolynomialMatcher::new(
            LevelManager::new(&f.eval),
            PowerMode::Plain,
            PowerLevels::default(),
        );
        let coeffs = coefficient_plaintexts(&f, 2);
        let powers = vec![f.eval.transform_to_ntt(f.encrypt(&[1]))];
        assert!(matches!(
            matcher.evaluate(&coeffs, powers),
            Err(Error::Configuration(_))
        ));
    }
}
