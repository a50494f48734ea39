//! Encrypted power generation
//!
//! The client sends encryptions of a few *source* powers `x^p`; the server
//! derives every power `x^1 .. x^D` by walking a [`PowerDag`] in increasing
//! order, each derived node being the relinearized product of two earlier
//! powers. The generated powers are then placed on the levels and domains the
//! matcher expects, according to the [`PowerMode`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::level::LevelManager;
use crate::error::{config_err, Result};
use crate::scheme::{Level, SchemeAdapter};

/// One node of a [`PowerDag`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerNode {
    /// Supplied by the client
    Source,
    /// `x^left · x^right`, with `left + right` equal to the node's power
    Product { left: usize, right: usize },
}

/// Arena of nodes for powers `1..=D`; node `p - 1` describes `x^p`.
///
/// Parents of a product always have smaller powers, so increasing order is a
/// valid evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PowerNode>", into = "Vec<PowerNode>")]
pub struct PowerDag {
    nodes: Vec<PowerNode>,
}

impl TryFrom<Vec<PowerNode>> for PowerDag {
    type Error = crate::error::Error;

    fn try_from(nodes: Vec<PowerNode>) -> Result<Self> {
        Self::new(nodes)
    }
}

impl From<PowerDag> for Vec<PowerNode> {
    fn from(dag: PowerDag) -> Self {
        dag.nodes
    }
}

impl PowerDag {
    /// Validate an explicit node list
    pub fn new(nodes: Vec<PowerNode>) -> Result<Self> {
        for (idx, node) in nodes.iter().enumerate() {
            let power = idx + 1;
            if let PowerNode::Product { left, right } = *node {
                if left == 0 || right == 0 || left + right != power {
                    return Err(config_err!(
                        "power {} cannot be the product of powers {} and {}",
                        power,
                        left,
                        right
                    ));
                }
            }
        }
        if let Some(PowerNode::Product { .. }) = nodes.first() {
            return Err(config_err!("power 1 must be a source"));
        }
        Ok(Self { nodes })
    }

    /// Minimum-depth DAG over powers `1..=max_power` from the given sources.
    ///
    /// Each derived power `p` picks the split `a + (p - a)` with the smallest
    /// resulting depth, preferring the most balanced split on ties.
    pub fn from_sources(max_power: usize, sources: &[usize]) -> Result<Self> {
        let source_set: BTreeSet<usize> = sources.iter().copied().collect();
        if source_set.len() != sources.len() {
            return Err(config_err!("duplicate source power"));
        }
        if let Some(&bad) = source_set.iter().find(|&&p| p == 0 || p > max_power) {
            return Err(config_err!(
                "source power {} outside 1..={}",
                bad,
                max_power
            ));
        }
        if max_power > 0 && !source_set.contains(&1) {
            return Err(config_err!("power 1 must be a source"));
        }

        let mut nodes = Vec::with_capacity(max_power);
        let mut depth = vec![0usize; max_power + 1];
        for power in 1..=max_power {
            if source_set.contains(&power) {
                nodes.push(PowerNode::Source);
                continue;
            }
            let (left, d) = (1..=power / 2)
                .rev()
                .map(|a| (a, depth[a].max(depth[power - a]) + 1))
                .min_by_key(|&(_, d)| d)
                .ok_or_else(|| config_err!("power {} has no split", power))?;
            depth[power] = d;
            nodes.push(PowerNode::Product {
                left,
                right: power - left,
            });
        }
        Ok(Self { nodes })
    }

    /// Highest power D
    pub fn max_power(&self) -> usize {
        self.nodes.len()
    }

    /// Node for `x^power`
    pub fn node(&self, power: usize) -> PowerNode {
        self.nodes[power - 1]
    }

    /// Source powers, ascending
    pub fn sources(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n, PowerNode::Source))
            .map(|(i, _)| i + 1)
    }

    /// Multiplicative depth of each power, index 0 unused
    pub fn depths(&self) -> Vec<usize> {
        let mut depth = vec![0usize; self.nodes.len() + 1];
        for (idx, node) in self.nodes.iter().enumerate() {
            if let PowerNode::Product { left, right } = *node {
                depth[idx + 1] = depth[left].max(depth[right]) + 1;
            }
        }
        depth
    }

    /// Multiplicative depth of the whole DAG
    pub fn depth(&self) -> usize {
        self.depths().into_iter().max().unwrap_or(0)
    }
}

/// Power layout handed to the matcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    /// Every power at the low level, NTT domain
    #[default]
    Plain,
    /// Powers `1..=low_degree` at the low level in NTT domain; multiples of
    /// `low_degree + 1` at the high level in coefficient domain
    PatersonStockmeyer { low_degree: usize },
}

impl PowerMode {
    /// Mode from the protocol's `ps_low_power`; 0 selects [`PowerMode::Plain`]
    pub fn from_ps_low_power(low_power: usize) -> Self {
        match low_power {
            0 => PowerMode::Plain,
            low_degree => PowerMode::PatersonStockmeyer { low_degree },
        }
    }
}

/// Chain indices the power bands are moved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerLevels {
    /// Chain index of the low powers (and of every power in plain mode)
    pub low_chain_index: usize,
    /// Chain index of the high powers
    pub high_chain_index: usize,
}

impl Default for PowerLevels {
    fn default() -> Self {
        Self {
            low_chain_index: 2,
            high_chain_index: 1,
        }
    }
}

impl PowerLevels {
    /// Low and high band levels on the chain behind `levels`
    pub fn resolve<S: SchemeAdapter>(&self, levels: &LevelManager<'_, S>) -> Result<(Level, Level)> {
        let low = levels.level_for_chain_index(self.low_chain_index);
        let high = levels.level_for_chain_index(self.high_chain_index);
        if high > low {
            return Err(config_err!(
                "high powers at {} cannot sit above low powers at {}",
                high,
                low
            ));
        }
        Ok((low, high))
    }
}

/// Derives every power of the query value from its source powers
pub struct PowerGenerator<'a, S: SchemeAdapter> {
    levels: LevelManager<'a, S>,
    dag: &'a PowerDag,
    mode: PowerMode,
    power_levels: PowerLevels,
}

impl<'a, S: SchemeAdapter> PowerGenerator<'a, S> {
    pub fn new(
        levels: LevelManager<'a, S>,
        dag: &'a PowerDag,
        mode: PowerMode,
        power_levels: PowerLevels,
    ) -> Self {
        Self {
            levels,
            dag,
            mode,
            power_levels,
        }
    }

    /// All powers `x^1 ..= x^D`; entry `p - 1` holds `x^p`.
    ///
    /// # Errors
    ///
    /// Configuration error on missing, duplicate or unexpected sources, on a
    /// source below the low power level, or on a Paterson–Stockmeyer split
    /// with `low_degree >= D`.
    pub fn generate(&self, sources: Vec<(usize, S::Ciphertext)>) -> Result<Vec<S::Ciphertext>> {
        let scheme = self.levels.scheme();
        let max_power = self.dag.max_power();

        if let PowerMode::PatersonStockmeyer { low_degree } = self.mode {
            if max_power > 0 && low_degree >= max_power {
                return Err(config_err!(
                    "low degree {} must be below the maximum power {}",
                    low_degree,
                    max_power
                ));
            }
        }
        let (low, high) = self.power_levels.resolve(&self.levels)?;

        let mut slots: Vec<Option<S::Ciphertext>> = (0..max_power).map(|_| None).collect();
        for (power, ct) in sources {
            if power == 0 || power > max_power || self.dag.node(power) != PowerNode::Source {
                return Err(config_err!("unexpected source power {}", power));
            }
            if slots[power - 1].is_some() {
                return Err(config_err!("duplicate source power {}", power));
            }
            let level = scheme.level_of(&ct);
            if level < low {
                return Err(config_err!(
                    "source power {} at {} sits below the power level {}",
                    power,
                    level,
                    low
                ));
            }
            slots[power - 1] = Some(self.levels.ensure_coeff(ct));
        }

        for power in 1..=max_power {
            match self.dag.node(power) {
                PowerNode::Source => {
                    if slots[power - 1].is_none() {
                        return Err(config_err!("missing source power {}", power));
                    }
                }
                PowerNode::Product { left, right } => {
                    let (a, b) = match (&slots[left - 1], &slots[right - 1]) {
                        (Some(a), Some(b)) => (a, b),
                        _ => return Err(config_err!("power {} evaluated before its parents", power)),
                    };
                    let product = if left == right {
                        scheme.square(a)
                    } else {
                        let common = scheme.level_of(a).min(scheme.level_of(b));
                        let a = self.levels.mod_switch_to(a.clone(), common);
                        let b = self.levels.mod_switch_to(b.clone(), common);
                        scheme.multiply(&a, &b)
                    };
                    slots[power - 1] = Some(scheme.relinearize(product));
                }
            }
        }

        debug!(max_power, mode = ?self.mode, %low, %high, "generated powers");
        let powers = slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                let power = idx + 1;
                let ct = slot.ok_or_else(|| config_err!("power {} was not generated", power))?;
                Ok(self.place(power, ct, low, high))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(powers)
    }

    /// Move one power to its band's level and domain
    fn place(&self, power: usize, ct: S::Ciphertext, low: Level, high: Level) -> S::Ciphertext {
        match self.mode {
            PowerMode::Plain => self.levels.ensure_ntt(self.levels.mod_switch_to(ct, low)),
            PowerMode::PatersonStockmeyer { low_degree } => {
                if power <= low_degree {
                    self.levels.ensure_ntt(self.levels.mod_switch_to(ct, low))
                } else if power % (low_degree + 1) == 0 {
                    self.levels.ensure_coeff(self.levels.mod_switch_to(ct, high))
                } else {
                    ct
                }
            }
        }
    }
}
