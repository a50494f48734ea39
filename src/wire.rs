//! Serialized blobs exchanged between client and server
//!
//! Everything crossing the boundary (parameters, evaluation keys, queries,
//! replies, plaintext databases) is a serde type. Binary blobs use bincode;
//! parameter files use JSON.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bfv::{BfvContext, BfvEvaluator, EvaluationKeys};
use crate::error::Result;
use crate::params::BfvParams;

/// Encode a value as a bincode blob
pub fn to_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

/// Decode a bincode blob
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// Pretty JSON, for parameter files
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn from_json<T: DeserializeOwned>(json: &str) -> Result<T> {
    Ok(serde_json::from_str(json)?)
}

/// Rebuild a server-side evaluator from a parameter blob and the client's
/// evaluation-key blob
pub fn evaluator_from_bytes(params_blob: &[u8], keys_blob: &[u8]) -> Result<BfvEvaluator> {
    let params: BfvParams = from_bytes(params_blob)?;
    let ctx = Arc::new(BfvContext::new(params)?);
    let keys: EvaluationKeys = from_bytes(keys_blob)?;
    Ok(BfvEvaluator::new(ctx, keys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_truncated_blob_is_serialization_error() {
        let bytes = to_bytes(&vec![1u64, 2, 3]).unwrap();
        let err = from_bytes::<Vec<u64>>(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_params_json_roundtrip() {
        let params = BfvParams::insecure_test();
        let json = to_json(&params).unwrap();
        assert_eq!(from_json::<BfvParams>(&json).unwrap(), params);
        assert!(matches!(from_json::<BfvParams>("{"), Err(Error::Json(_))));
    }
}
