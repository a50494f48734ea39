//! hepir: homomorphic private retrieval and matching
//!
//! Server-side algorithms for private information retrieval (PIR) and private
//! matching over a leveled homomorphic encryption scheme:
//!
//! - Oblivious expansion of one compact query into per-item selectors
//! - Encrypted power generation from a power-dependency DAG
//! - Polynomial matching, naive or Paterson–Stockmeyer
//! - Recursive dimension-by-dimension folding of a database
//!
//! The engine ([`engine`]) is generic over [`scheme::SchemeAdapter`]. The
//! crate ships a leveled RNS-BFV backend ([`bfv`]) and the matching client
//! helpers ([`client`]).

pub mod bfv;
pub mod client;
pub mod engine;
pub mod error;
pub mod math;
pub mod noise;
pub mod params;
pub mod scheme;
pub mod wire;

#[cfg(test)]
mod testing;

pub use client::Client;
pub use engine::{
    respond_matching, respond_retrieval, Database, DimensionVector, ExpansionVariant, FoldMode,
    PowerDag, ProtocolParams, ReduceConfig,
};
pub use error::{Error, Result};
pub use noise::{check_matching_noise, check_retrieval_noise, NoiseReport};
pub use params::BfvParams;
pub use scheme::{Level, SchemeAdapter};
