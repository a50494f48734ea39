//! Database layout for dimension folding
//!
//! Entries are stored row-major over a [`DimensionVector`]: dimension 0 is
//! outermost, so entry `(i_0, .., i_{d-1})` sits at
//! `i_0·(n_1···n_{d-1}) + .. + i_{d-1}`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::level::LevelManager;
use crate::error::{config_err, Result};
use crate::scheme::{Level, SchemeAdapter};

/// Sizes `n_0 .. n_{d-1}` of the folding dimensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct DimensionVector {
    sizes: Vec<usize>,
}

impl DimensionVector {
    /// # Errors
    ///
    /// Configuration error when `sizes` is empty or holds a zero.
    pub fn new(sizes: Vec<usize>) -> Result<Self> {
        if sizes.is_empty() {
            return Err(config_err!("at least one dimension is required"));
        }
        if let Some(pos) = sizes.iter().position(|&n| n == 0) {
            return Err(config_err!("dimension {} has size zero", pos));
        }
        sizes
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .ok_or_else(|| config_err!("dimension product overflows"))?;
        Ok(Self { sizes })
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Number of dimensions d
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Padded database length `∏ n_i`
    pub fn total(&self) -> usize {
        self.sizes.iter().product()
    }

    /// Flat position of a multi-index.
    ///
    /// # Errors
    ///
    /// Configuration error on a wrong arity or an out-of-range component.
    pub fn flat_index(&self, index: &[usize]) -> Result<usize> {
        if index.len() != self.sizes.len() {
            return Err(config_err!(
                "index has {} components for {} dimensions",
                index.len(),
                self.sizes.len()
            ));
        }
        let mut flat = 0;
        for (dim, (&i, &n)) in index.iter().zip(&self.sizes).enumerate() {
            if i >= n {
                return Err(config_err!(
                    "index {} out of range for dimension {} of size {}",
                    i,
                    dim,
                    n
                ));
            }
            flat = flat * n + i;
        }
        Ok(flat)
    }

    /// Multi-index of a flat position.
    ///
    /// # Errors
    ///
    /// Configuration error when `flat` is past the padded length.
    pub fn multi_index(&self, mut flat: usize) -> Result<Vec<usize>> {
        if flat >= self.total() {
            return Err(config_err!(
                "flat index {} out of range for {} entries",
                flat,
                self.total()
            ));
        }
        let mut index = vec![0; self.sizes.len()];
        for (slot, &n) in index.iter_mut().zip(&self.sizes).rev() {
            *slot = flat % n;
            flat /= n;
        }
        Ok(index)
    }
}

impl TryFrom<Vec<usize>> for DimensionVector {
    type Error = crate::error::Error;

    fn try_from(sizes: Vec<usize>) -> Result<Self> {
        Self::new(sizes)
    }
}

impl From<DimensionVector> for Vec<usize> {
    fn from(dims: DimensionVector) -> Self {
        dims.sizes
    }
}

/// Ordered plaintext entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database<P> {
    entries: Vec<P>,
}

impl<P: Clone + Send + Sync> Database<P> {
    pub fn new(entries: Vec<P>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[P] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<P> {
        self.entries
    }

    /// Pad with zero plaintexts up to `dims.total()`.
    ///
    /// # Errors
    ///
    /// Configuration error when the database already exceeds the shape.
    pub fn pad_to_shape<S>(&mut self, scheme: &S, dims: &DimensionVector) -> Result<()>
    where
        S: SchemeAdapter<Plaintext = P>,
    {
        let total = dims.total();
        if self.entries.len() > total {
            return Err(config_err!(
                "{} entries do not fit dimensions {:?}",
                self.entries.len(),
                dims.sizes()
            ));
        }
        let zero = scheme.plaintext_from_coeffs(Vec::new());
        self.entries.resize(total, zero);
        Ok(())
    }

    /// Transform every entry to NTT form for `level` ahead of serving.
    /// Entries already prepared for `level` are kept.
    pub fn prepare_ntt<S>(&mut self, levels: &LevelManager<'_, S>, level: Level)
    where
        S: SchemeAdapter<Plaintext = P>,
    {
        self.entries
            .par_iter_mut()
            .for_each(|entry| *entry = levels.plain_for(entry, level).into_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use proptest::prelude::*;

    #[test]
    fn test_dimension_validation() {
        assert!(DimensionVector::new(vec![]).is_err());
        assert!(DimensionVector::new(vec![3, 0]).is_err());
        assert!(DimensionVector::new(vec![usize::MAX, 2]).is_err());
        let dims = DimensionVector::new(vec![3, 5, 2]).unwrap();
        assert_eq!(dims.total(), 30);
        assert_eq!(dims.len(), 3);
    }

    #[test]
    fn test_index_mapping() {
        let dims = DimensionVector::new(vec![3, 5, 2]).unwrap();
        assert_eq!(dims.flat_index(&[0, 0, 1]).unwrap(), 1);
        assert_eq!(dims.flat_index(&[1, 0, 0]).unwrap(), 10);
        assert_eq!(dims.flat_index(&[2, 4, 1]).unwrap(), 29);
        assert_eq!(dims.multi_index(13).unwrap(), vec![1, 1, 1]);
        assert!(dims.flat_index(&[3, 0, 0]).is_err());
        assert!(dims.flat_index(&[0, 0]).is_err());
        assert!(dims.multi_index(30).is_err());
    }

    proptest! {
        #[test]
        fn prop_flat_and_multi_index_agree(
            sizes in prop::collection::vec(1usize..6, 1..5),
            seed in any::<usize>(),
        ) {
            let dims = DimensionVector::new(sizes).unwrap();
            let flat = seed % dims.total();
            let index = dims.multi_index(flat).unwrap();
            prop_assert!(index.iter().zip(dims.sizes()).all(|(&i, &n)| i < n));
            prop_assert_eq!(dims.flat_index(&index).unwrap(), flat);
        }
    }

    #[test]
    fn test_dimension_json_rejects_zero() {
        assert!(serde_json::from_str::<DimensionVector>("[4, 0]").is_err());
        let dims: DimensionVector = serde_json::from_str("[4, 2]").unwrap();
        assert_eq!(serde_json::to_string(&dims).unwrap(), "[4,2]");
    }

    #[test]
    fn test_pad_and_prepare() {
        let f = Fixture::new(&[]);
        let dims = DimensionVector::new(vec![2, 3]).unwrap();
        let mut db = Database::new(vec![f.eval.plaintext_from_coeffs(vec![5]); 4]);
        db.pad_to_shape(&f.eval, &dims).unwrap();
        assert_eq!(db.len(), 6);
        assert!(f.eval.plaintext_coeffs(&db.entries()[5]).iter().all(|&c| c == 0));

        let levels = LevelManager::new(&f.eval);
        let top = levels.top_level();
        db.prepare_ntt(&levels, top);
        assert!(db
            .entries()
            .iter()
            .all(|pt| f.eval.plain_ntt_level(pt) == Some(top)));

        let small = DimensionVector::new(vec![2]).unwrap();
        assert!(db.pad_to_shape(&f.eval, &small).is_err());
    }
}
