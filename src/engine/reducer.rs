//! Recursive dimension folding
//!
//! # Algorithm
//!
//! The database is viewed as a `n_0 × n_1 × .. × n_{d-1}` array, dimension 0
//! outermost. Each dimension `i` receives one compact query that expands into
//! `n_i` selection ciphertexts. Folding dimension `i` reduces the current
//! layer column by column:
//!
//! ```text
//! out[col] = Σ_j sel[j] · layer[col + j·stride],   stride = len(layer) / n_i
//! ```
//!
//! Dimension 0 folds the plaintext database. Later dimensions fold the
//! ciphertexts produced by the previous one, according to [`FoldMode`]:
//!
//! * `Decompose` switches each intermediate to the decomposition level and
//!   splits it into `R = 2·expansion_ratio` plaintexts, so the next layer is a
//!   plaintext database `R` times longer (entry `col·R + r`). The reply holds
//!   `R^{d-1}` ciphertexts.
//! * `Multiply` keeps the intermediates encrypted and folds them with
//!   ciphertext products, one relinearization per column. The reply is a
//!   single ciphertext.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::database::{Database, DimensionVector};
use super::expand::{ExpansionVariant, QueryExpander};
use super::level::LevelManager;
use crate::error::{config_err, Result};
use crate::scheme::{Level, SchemeAdapter};

/// How dimensions after the first are folded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldMode {
    /// Decompose intermediates into plaintexts; ciphertext × plaintext only
    #[default]
    Decompose,
    /// Ciphertext × ciphertext products on encrypted intermediates
    Multiply,
}

/// Folding configuration shared by the server and the decoding client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReduceConfig {
    pub fold_mode: FoldMode,
    pub expansion: ExpansionVariant,
    /// Chain index intermediates are switched to before decomposition
    pub decompose_chain_index: usize,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            fold_mode: FoldMode::Decompose,
            expansion: ExpansionVariant::Direct,
            decompose_chain_index: 0,
        }
    }
}

/// Current layer being folded
enum Layer<'d, S: SchemeAdapter> {
    Plain(&'d [S::Plaintext]),
    Decomposed(Vec<S::Plaintext>),
    Encrypted(Vec<S::Ciphertext>),
}

impl<S: SchemeAdapter> Layer<'_, S> {
    fn len(&self) -> usize {
        match self {
            Layer::Plain(entries) => entries.len(),
            Layer::Decomposed(entries) => entries.len(),
            Layer::Encrypted(cts) => cts.len(),
        }
    }
}

/// Folds a database along its dimensions with one query per dimension
pub struct DimensionReducer<'a, S: SchemeAdapter> {
    levels: LevelManager<'a, S>,
    config: ReduceConfig,
}

impl<'a, S: SchemeAdapter> DimensionReducer<'a, S> {
    pub fn new(levels: LevelManager<'a, S>, config: ReduceConfig) -> Self {
        Self { levels, config }
    }

    pub fn config(&self) -> &ReduceConfig {
        &self.config
    }

    /// Level intermediates are decomposed at
    pub fn decompose_level(&self) -> Level {
        self.levels
            .level_for_chain_index(self.config.decompose_chain_index)
    }

    /// Plaintexts per decomposed intermediate, `2 × expansion_ratio`
    pub fn decomposition_width(&self) -> usize {
        2 * self.levels.expansion_ratio(self.decompose_level())
    }

    /// Number of ciphertexts in a reply for `dims`
    pub fn reply_len(&self, dims: &DimensionVector) -> usize {
        match self.config.fold_mode {
            FoldMode::Decompose => self.decomposition_width().pow(dims.len() as u32 - 1),
            FoldMode::Multiply => 1,
        }
    }

    /// Fold `db` along `dims`, one compact query per dimension.
    ///
    /// Database entries may be in coefficient form or prepared in NTT form
    /// for the top level. Replies are in coefficient domain at the last level.
    ///
    /// # Errors
    ///
    /// Configuration error on a query count different from the number of
    /// dimensions, a database length different from `∏ n_i`, or an expansion
    /// failure.
    pub fn reduce(
        &self,
        db: &Database<S::Plaintext>,
        dims: &DimensionVector,
        queries: Vec<S::Ciphertext>,
    ) -> Result<Vec<S::Ciphertext>> {
        if queries.len() != dims.len() {
            return Err(config_err!(
                "expected {} queries for {} dimensions, got {}",
                dims.len(),
                dims.len(),
                queries.len()
            ));
        }
        if db.len() != dims.total() {
            return Err(config_err!(
                "database holds {} entries but dimensions {:?} need {}",
                db.len(),
                dims.sizes(),
                dims.total()
            ));
        }

        let expander = QueryExpander::new(self.levels, self.config.expansion);
        let last_dim = dims.len() - 1;
        let mut layer: Layer<'_, S> = Layer::Plain(db.entries());
        let mut outputs = Vec::new();

        for (dim, (query, &size)) in queries.into_iter().zip(dims.sizes()).enumerate() {
            let selectors = expander.expand(query, size)?;
            if selectors.len() != size {
                return Err(config_err!(
                    "dimension {} expanded to {} selectors, expected {}",
                    dim,
                    selectors.len(),
                    size
                ));
            }
            if let Layer::Plain(entries) = &layer {
                self.check_prepared(entries, &selectors)?;
            }
            let stride = layer.len() / size;
            debug!(dim, size, stride, mode = ?self.config.fold_mode, "folding dimension");

            outputs = match &layer {
                Layer::Plain(entries) => self.fold_plain(entries, selectors, stride),
                Layer::Decomposed(entries) => self.fold_plain(entries, selectors, stride),
                Layer::Encrypted(cts) => self.fold_encrypted(cts, selectors, stride),
            };
            trace!(dim, outputs = outputs.len(), "dimension folded");

            if dim == last_dim {
                break;
            }
            layer = match self.config.fold_mode {
                FoldMode::Decompose => Layer::Decomposed(self.decompose_all(std::mem::take(&mut outputs))),
                FoldMode::Multiply => Layer::Encrypted(std::mem::take(&mut outputs)),
            };
        }

        Ok(outputs
            .into_par_iter()
            .map(|ct| self.levels.mod_switch_to_last(self.levels.ensure_coeff(ct)))
            .collect())
    }

    /// Entries pre-transformed with [`Database::prepare_ntt`] only multiply
    /// selectors at the level they were prepared for.
    fn check_prepared(&self, entries: &[S::Plaintext], selectors: &[S::Ciphertext]) -> Result<()> {
        let scheme = self.levels.scheme();
        let mut levels: Vec<Level> = selectors.iter().map(|ct| scheme.level_of(ct)).collect();
        levels.sort_unstable();
        levels.dedup();
        for level in levels {
            let mismatch = entries
                .iter()
                .find_map(|pt| scheme.plain_ntt_level(pt).filter(|&have| have != level));
            if let Some(have) = mismatch {
                return Err(config_err!(
                    "database prepared for {} cannot serve a query at {}",
                    have,
                    level
                ));
            }
        }
        Ok(())
    }

    /// Ciphertext × plaintext fold in NTT domain
    fn fold_plain(
        &self,
        entries: &[S::Plaintext],
        selectors: Vec<S::Ciphertext>,
        stride: usize,
    ) -> Vec<S::Ciphertext> {
        let scheme = self.levels.scheme();
        let selectors: Vec<S::Ciphertext> = selectors
            .into_par_iter()
            .map(|ct| self.levels.ensure_ntt(ct))
            .collect();

        (0..stride)
            .into_par_iter()
            .map(|col| {
                let mut acc: Option<S::Ciphertext> = None;
                for (j, sel) in selectors.iter().enumerate() {
                    let level = scheme.level_of(sel);
                    let pt = self.levels.plain_for(&entries[col + j * stride], level);
                    let term = self.levels.multiply_plain(sel.clone(), &pt);
                    match acc.as_mut() {
                        Some(acc) => scheme.add_assign(acc, &term),
                        None => acc = Some(term),
                    }
                }
                self.levels.ensure_coeff(acc.unwrap_or_else(|| unreachable!()))
            })
            .collect()
    }

    /// Ciphertext × ciphertext fold, one relinearization per column
    fn fold_encrypted(
        &self,
        cts: &[S::Ciphertext],
        selectors: Vec<S::Ciphertext>,
        stride: usize,
    ) -> Vec<S::Ciphertext> {
        let scheme = self.levels.scheme();
        (0..stride)
            .into_par_iter()
            .map(|col| {
                let mut acc: Option<S::Ciphertext> = None;
                for (j, sel) in selectors.iter().enumerate() {
                    let entry = &cts[col + j * stride];
                    let common = scheme.level_of(sel).min(scheme.level_of(entry));
                    let sel = self.levels.mod_switch_to(sel.clone(), common);
                    let entry = self.levels.mod_switch_to(entry.clone(), common);
                    let term = scheme.multiply(&sel, &entry);
                    match acc.as_mut() {
                        Some(acc) => scheme.add_assign(acc, &term),
                        None => acc = Some(term),
                    }
                }
                scheme.relinearize(acc.unwrap_or_else(|| unreachable!()))
            })
            .collect()
    }

    /// Next plaintext layer: entry `col·R + r` is digit plaintext `r` of output `col`
    fn decompose_all(&self, outputs: Vec<S::Ciphertext>) -> Vec<S::Plaintext> {
        let level = self.decompose_level();
        outputs
            .into_par_iter()
            .flat_map_iter(|ct| {
                let ct = self.levels.mod_switch_to(self.levels.ensure_coeff(ct), level);
                self.levels.decompose(&ct)
            })
            .collect()
    }
}
