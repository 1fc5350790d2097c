//! Event schemas, log decoding, and shared utilities for tracemirror.
//!
//! This crate provides:
//! - The event schema registry, built from contract ABI files
//! - Classification and ABI decoding of raw chain log entries
//! - The closed set of event kinds the mirror projects
//! - Prometheus metrics helpers
//! - Shared error types

pub mod abi;
mod decode;
mod entry;
mod error;
pub mod metrics;
mod schema;

pub use abi::FieldValue;
pub use decode::{
    BatchRegistered, DecodedEvent, EventFields, EventKind, OwnershipTransferred, RoleChange,
    StageRecorded, UNKNOWN_EVENT, decode,
};
pub use entry::RawLogEntry;
pub use error::{DecodeError, SchemaLoadError};
pub use schema::Registry;
