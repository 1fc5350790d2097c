//! Error types for schema loading and log decoding.
//!
//! The two are kept apart because they fail at different scopes: a
//! [`SchemaLoadError`] stops the process at startup, a [`DecodeError`] only
//! skips one log entry.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to load event schemas from an ABI file.
#[derive(Error, Debug)]
pub enum SchemaLoadError {
    /// The file could not be read.
    #[error("failed to read schema file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON.
    #[error("schema file {} is not valid JSON: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The file is JSON but not an ABI description.
    #[error("schema file {} is malformed: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },
}

/// Failure to decode a log entry against its schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Topics or data do not match the event's ABI.
    #[error("{event}: {reason}")]
    Abi { event: String, reason: String },

    /// A field required to project the event is absent from the schema.
    #[error("{event}: missing field '{field}'")]
    MissingField { event: String, field: String },

    /// A field required to project the event has the wrong type.
    #[error("{event}: field '{field}' should be {expected}")]
    FieldType {
        event: String,
        field: String,
        expected: &'static str,
    },

    /// A numeric field does not fit the range its projection needs.
    #[error("{event}: field '{field}' is out of range")]
    OutOfRange { event: String, field: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_names_event() {
        let err = DecodeError::MissingField {
            event: "StageRecorded".to_string(),
            field: "actor".to_string(),
        };
        assert_eq!(err.to_string(), "StageRecorded: missing field 'actor'");
    }

    #[test]
    fn test_schema_load_error_mentions_path() {
        let err = SchemaLoadError::Malformed {
            path: PathBuf::from("abis/Trace.json"),
            reason: "missing 'abi' array".to_string(),
        };
        assert!(err.to_string().contains("abis/Trace.json"));
    }
}
