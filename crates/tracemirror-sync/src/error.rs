//! Error types for the sync engine.

use std::time::Duration;

use thiserror::Error;

pub use tracemirror_core::{DecodeError, SchemaLoadError};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up or running the sync engine.
#[derive(Error, Debug)]
pub enum Error {
    /// The origin could not be reached or answered with garbage.
    #[error(transparent)]
    OriginUnavailable(#[from] OriginError),

    /// Event schemas could not be loaded.
    #[error(transparent)]
    SchemaLoad(#[from] SchemaLoadError),

    /// A batch could not be applied to the store.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Database setup error (open, pragmas, schema).
    #[error("Database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure talking to the chain node. Never fatal; the fetch is retried on
/// the next interval.
#[derive(Error, Debug)]
pub enum OriginError {
    /// Transport failure, HTTP error status, or client-side timeout.
    #[error("origin request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The node returned a JSON-RPC error object.
    #[error("origin returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The response did not have the expected shape.
    #[error("malformed origin response: {0}")]
    Malformed(String),
}

/// Failure applying a batch to the store. The batch transaction is rolled
/// back and the whole batch is retried.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// SQLite rejected a statement or the commit.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// No pooled connection became free in time.
    #[error("no store connection available after {0:?}")]
    PoolTimeout(Duration),

    /// The pool could not hand out or run a connection.
    #[error("store pool error: {0}")]
    Pool(String),
}
