//! Server-side retrieval and matching engine.
//!
//! Every component is generic over [`SchemeAdapter`](crate::scheme::SchemeAdapter)
//! and borrows it through a [`LevelManager`], which owns all level and
//! transform-domain changes.
//!
//! - [`QueryExpander`]: one compact query into per-item selectors
//! - [`PowerGenerator`]: every power of an encrypted value from a few sources
//! - [`PolynomialMatcher`]: plaintext-coefficient polynomial on those powers
//! - [`DimensionReducer`]: recursive folding of a multi-dimensional database
//! - [`respond`]: request-level facade over the above

pub mod database;
pub mod expand;
pub mod level;
pub mod matcher;
pub mod powers;
pub mod reducer;
pub mod respond;

pub use database::{Database, DimensionVector};
pub use expand::{expansion_depth, expansion_galois_elements, ExpansionVariant, QueryExpander};
pub use level::LevelManager;
pub use matcher::PolynomialMatcher;
pub use powers::{PowerDag, PowerGenerator, PowerLevels, PowerMode, PowerNode};
pub use reducer::{DimensionReducer, FoldMode, ReduceConfig};
pub use respond::{
    respond_matching, respond_matching_bytes, respond_retrieval, respond_retrieval_bytes,
    ProtocolParams,
};
