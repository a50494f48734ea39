//! Offline noise validation
//!
//! Runs a synthetic worst-case request against a parameter set and reports
//! the smallest invariant noise budget left in the reply. Budget exhaustion is
//! only ever reported here, never raised by the engine at request time.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::Client;
use crate::engine::{respond_matching, respond_retrieval, Database, ProtocolParams};
use crate::error::Result;
use crate::math::modular::pow_mod;
use crate::params::BfvParams;
use crate::scheme::SchemeAdapter;

/// Outcome of a noise check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseReport {
    /// Smallest budget left over all reply ciphertexts, in bits
    pub budget_bits: u32,
    /// Budget left and the reply decoded to the expected value
    pub passed: bool,
}

/// Retrieve the last entry of a database filled with `t - 1` everywhere.
pub fn check_retrieval_noise(params: BfvParams, protocol: &ProtocolParams, seed: Option<u64>) -> Result<NoiseReport> {
    let dims = protocol.dimension_vector()?;
    let mut client = Client::for_retrieval(params, dims.sizes(), seed)?;
    let server = client.server_evaluator();
    let max = server.plain_modulus() - 1;
    let n = server.ring_degree();

    let entry = server.plaintext_from_coeffs(vec![max; n]);
    let db = Database::new(vec![entry; dims.total()]);
    let queries = client.retrieval_query_flat(dims.sizes(), dims.total() - 1, protocol.reduce.expansion)?;
    let reply = respond_retrieval(&server, protocol, &db, queries)?;

    let budget_bits = reply
        .iter()
        .map(|ct| client.noise_budget(ct))
        .min()
        .unwrap_or(0);
    let decoded = client.decode_retrieval(reply, dims.sizes(), &protocol.reduce)?;
    let report = NoiseReport {
        budget_bits,
        passed: budget_bits > 0 && decoded == vec![max; n],
    };
    log_report("retrieval", &report);
    Ok(report)
}

/// Evaluate a maximum-degree polynomial with all coefficients `t - 1` at
/// `x = t - 1`.
pub fn check_matching_noise(params: BfvParams, protocol: &ProtocolParams, seed: Option<u64>) -> Result<NoiseReport> {
    let mut client = Client::new(params, &[], seed)?;
    let server = client.server_evaluator();
    let t = server.plain_modulus();
    let max = t - 1;
    let n = server.ring_degree();
    let degree = protocol.power_dag.max_power();

    let coeffs = vec![server.plaintext_from_coeffs(vec![max; n]); degree + 1];
    let sources = client.matching_query(max, &protocol.source_powers)?;
    let reply = respond_matching(&server, protocol, &coeffs, sources)?;

    let expected = (0..=degree as u64).fold(0u64, |acc, i| (acc + max * pow_mod(max, i, t)) % t);
    let budget_bits = client.noise_budget(&reply);
    let decoded = client.decode_matching(&reply);
    let report = NoiseReport {
        budget_bits,
        passed: budget_bits > 0 && decoded.iter().all(|&v| v == expected),
    };
    log_report("matching", &report);
    Ok(report)
}

fn log_report(kind: &str, report: &NoiseReport) {
    if report.passed {
        info!(kind, budget_bits = report.budget_bits, "noise check passed");
    } else {
        warn!(kind, budget_bits = report.budget_bits, "noise check failed");
    }
}
