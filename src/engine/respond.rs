//! Server facade: one call per request kind
//!
//! The facade wires the components together for a single request. It holds
//! no state between requests; the scheme (with its keys) and the database
//! are borrowed immutably and may be shared across threads.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::database::{Database, DimensionVector};
use super::level::LevelManager;
use super::matcher::PolynomialMatcher;
use super::powers::{PowerDag, PowerGenerator, PowerLevels, PowerMode};
use super::reducer::{DimensionReducer, ReduceConfig};
use crate::error::{config_err, Result};
use crate::scheme::SchemeAdapter;
use crate::wire;

/// Request-independent protocol parameters agreed between client and server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Low degree L of the Paterson–Stockmeyer split; 0 disables it
    pub ps_low_power: usize,
    /// Folding dimensions n_0 .. n_{d-1}
    pub dimensions: Vec<usize>,
    /// How every power of the query value is derived
    pub power_dag: PowerDag,
    /// Powers the client encrypts, ascending
    pub source_powers: Vec<usize>,
    #[serde(default)]
    pub reduce: ReduceConfig,
    #[serde(default)]
    pub power_levels: PowerLevels,
}

impl ProtocolParams {
    /// Retrieval-only parameters
    pub fn retrieval(dimensions: Vec<usize>) -> Self {
        Self {
            ps_low_power: 0,
            dimensions,
            power_dag: PowerDag::default(),
            source_powers: Vec::new(),
            reduce: ReduceConfig::default(),
            power_levels: PowerLevels::default(),
        }
    }

    /// Matching-only parameters with a min-depth DAG over `source_powers`
    pub fn matching(max_power: usize, source_powers: Vec<usize>, ps_low_power: usize) -> Result<Self> {
        let power_dag = PowerDag::from_sources(max_power, &source_powers)?;
        let mut source_powers = source_powers;
        source_powers.sort_unstable();
        Ok(Self {
            ps_low_power,
            dimensions: Vec::new(),
            power_dag,
            source_powers,
            reduce: ReduceConfig::default(),
            power_levels: PowerLevels::default(),
        })
    }

    pub fn power_mode(&self) -> PowerMode {
        PowerMode::from_ps_low_power(self.ps_low_power)
    }

    pub fn dimension_vector(&self) -> Result<DimensionVector> {
        DimensionVector::new(self.dimensions.clone())
    }

    /// Check that the source powers are exactly the DAG's sources
    pub fn validate_matching(&self) -> Result<()> {
        let dag_sources: Vec<usize> = self.power_dag.sources().collect();
        let mut sources = self.source_powers.clone();
        sources.sort_unstable();
        if dag_sources != sources {
            return Err(config_err!(
                "source powers {:?} do not match the DAG sources {:?}",
                self.source_powers,
                dag_sources
            ));
        }
        Ok(())
    }
}

/// Client ciphertexts must be fresh (rank 2) and belong to the server's chain
fn check_client_ciphertext<S: SchemeAdapter>(scheme: &S, idx: usize, ct: &S::Ciphertext) -> Result<()> {
    if !scheme.fits_chain(ct) {
        return Err(config_err!(
            "ciphertext {} does not match the ring or modulus chain",
            idx
        ));
    }
    if scheme.rank(ct) != 2 {
        return Err(config_err!(
            "ciphertext {} has rank {}, expected 2",
            idx,
            scheme.rank(ct)
        ));
    }
    Ok(())
}

/// Answer a retrieval request: one compact query per dimension in, folded
/// reply out.
pub fn respond_retrieval<S: SchemeAdapter>(
    scheme: &S,
    params: &ProtocolParams,
    db: &Database<S::Plaintext>,
    queries: Vec<S::Ciphertext>,
) -> Result<Vec<S::Ciphertext>> {
    let dims = params.dimension_vector()?;
    queries
        .iter()
        .enumerate()
        .try_for_each(|(idx, ct)| check_client_ciphertext(scheme, idx, ct))?;
    info!(dimensions = ?dims.sizes(), entries = db.len(), "answering retrieval");
    DimensionReducer::new(LevelManager::new(scheme), params.reduce).reduce(db, &dims, queries)
}

/// Answer a matching request: encrypted source powers in, `P(x)` out.
///
/// `coeffs` holds the `D + 1` coefficient plaintexts of the polynomial.
pub fn respond_matching<S: SchemeAdapter>(
    scheme: &S,
    params: &ProtocolParams,
    coeffs: &[S::Plaintext],
    sources: Vec<(usize, S::Ciphertext)>,
) -> Result<S::Ciphertext> {
    params.validate_matching()?;
    sources
        .iter()
        .enumerate()
        .try_for_each(|(idx, (_, ct))| check_client_ciphertext(scheme, idx, ct))?;
    let levels = LevelManager::new(scheme);
    let mode = params.power_mode();
    info!(degree = params.power_dag.max_power(), ?mode, "answering matching");
    let powers = PowerGenerator::new(levels, &params.power_dag, mode, params.power_levels)
        .generate(sources)?;
    PolynomialMatcher::new(levels, mode, params.power_levels).evaluate(coeffs, powers)
}

/// [`respond_retrieval`] over serialized blobs: `Vec<Ciphertext>` in and out
pub fn respond_retrieval_bytes<S: SchemeAdapter>(
    scheme: &S,
    params: &ProtocolParams,
    db: &Database<S::Plaintext>,
    query_blob: &[u8],
) -> Result<Vec<u8>> {
    let queries: Vec<S::Ciphertext> = wire::from_bytes(query_blob)?;
    let reply = respond_retrieval(scheme, params, db, queries)?;
    wire::to_bytes(&reply)
}

/// [`respond_matching`] over serialized blobs: `Vec<(power, Ciphertext)>` in,
/// one `Ciphertext` out
pub fn respond_matching_bytes<S: SchemeAdapter>(
    scheme: &S,
    params: &ProtocolParams,
    coeffs: &[S::Plaintext],
    source_blob: &[u8],
) -> Result<Vec<u8>> {
    let sources: Vec<(usize, S::Ciphertext)> = wire::from_bytes(source_blob)?;
    let reply = respond_matching(scheme, params, coeffs, sources)?;
    wire::to_bytes(&reply)
}
