//! hepir-noise-check: offline noise validation for a parameter set
//!
//! Reads BFV and protocol parameters from JSON, runs a synthetic worst-case
//! retrieval and/or matching request and prints the remaining noise budget.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use eyre::{Context, Result};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use hepir::noise::{check_matching_noise, check_retrieval_noise, NoiseReport};
use hepir::params::BfvParams;
use hepir::wire;
use hepir::ProtocolParams;

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Check {
    Retrieval,
    Matching,
    All,
}

#[derive(Parser)]
#[command(name = "hepir-noise-check")]
#[command(about = "Check that a parameter set leaves noise budget for worst-case requests")]
#[command(version)]
struct Args {
    /// BFV parameters (JSON). Defaults to the insecure test preset
    #[arg(long)]
    params: Option<PathBuf>,

    /// Protocol parameters (JSON)
    #[arg(long)]
    protocol: PathBuf,

    /// Which request kinds to check
    #[arg(long, value_enum, default_value = "all")]
    check: Check,

    /// Random seed for deterministic key generation (optional)
    #[arg(long)]
    seed: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    wire::from_json(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_report(kind: &str, report: &NoiseReport) {
    let status = if report.passed { "PASS" } else { "FAIL" };
    println!("{kind:<10} {status}  budget {} bits", report.budget_bits);
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let params: BfvParams = match &args.params {
        Some(path) => read_json(path)?,
        None => BfvParams::insecure_test(),
    };
    params
        .validate()
        .map_err(|e| eyre::eyre!("Invalid parameters: {}", e))?;
    let protocol: ProtocolParams = read_json(&args.protocol)?;

    info!("Ring dimension: {}", params.ring_dim);
    info!("Plaintext modulus: {}", params.plain_modulus);
    info!("Modulus chain: {} primes", params.moduli.len());

    let mut all_passed = true;

    if matches!(args.check, Check::Retrieval | Check::All) {
        let start = Instant::now();
        let report = check_retrieval_noise(params.clone(), &protocol, args.seed)
            .with_context(|| "Retrieval noise check failed to run")?;
        info!("Retrieval check time: {:.2?}", start.elapsed());
        print_report("retrieval", &report);
        all_passed &= report.passed;
    }

    if matches!(args.check, Check::Matching | Check::All) {
        let start = Instant::now();
        let report = check_matching_noise(params, &protocol, args.seed)
            .with_context(|| "Matching noise check failed to run")?;
        info!("Matching check time: {:.2?}", start.elapsed());
        print_report("matching", &report);
        all_passed &= report.passed;
    }

    if !all_passed {
        return Err(eyre::eyre!("Noise budget exhausted for this parameter set"));
    }
    Ok(())
}
