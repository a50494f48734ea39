//! Error handling for the retrieval engine.
//!
//! Configuration errors are the only failures a request can surface: the
//! caller and the engine disagree about a shape or a size. Representation
//! defects (wrong transform domain, wrong chain level) are programming errors
//! and panic at the point of detection instead.

use thiserror::Error;

/// Engine error.
#[derive(Debug, Error)]
pub enum Error {
    /// Shape or size mismatch between the caller's parameters and the engine.
    ///
    /// Fatal for the request; retrying without changing the parameters
    /// produces the same error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Scheme parameters rejected by [`crate::params::BfvParams::validate`].
    #[error("invalid parameters: {0}")]
    InvalidParameters(&'static str),

    /// Binary blob could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON parameter file could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Create a configuration [`Error`] with format string support
macro_rules! config_err {
    ($($arg:tt)*) => {
        $crate::error::Error::Configuration(format!($($arg)*))
    };
}

pub(crate) use config_err;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_err_formats_message() {
        let err = config_err!("expected {} queries, got {}", 3, 2);
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(
            err.to_string(),
            "configuration error: expected 3 queries, got 2"
        );
    }

    #[test]
    fn test_bincode_error_converts() {
        let bad: std::result::Result<Vec<u64>, bincode::Error> = bincode::deserialize(&[1, 2]);
        let err: Error = bad.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
