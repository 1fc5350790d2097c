//! Tracemirror sync engine.
//!
//! This crate mirrors supply-chain contract events from a chain node into a
//! local SQLite store that a serving layer can read instead of the chain.
//!
//! # Modules
//!
//! - [`origin`] - Chain access (`eth_blockNumber` / `eth_getLogs`)
//! - [`reconcile`] - Idempotent projection of decoded events
//! - [`store`] - Connection pool, transactional gateway, read-side queries
//! - [`poller`] - The fixed-interval poll loop
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │     Origin      │  JSON-RPC node, entries may repeat
//! └────────┬────────┘
//!          │  RawLogEntry
//!          ▼
//! ┌─────────────────┐
//! │     Decoder     │  tracemirror-core: registry lookup + ABI decode
//! └────────┬────────┘
//!          │  DecodedEvent
//!          ▼
//! ┌─────────────────┐
//! │   Reconciler    │  audit row first, then projection
//! └────────┬────────┘
//!          │  one transaction per batch, cursor included
//!          ▼
//! ┌─────────────────┐
//! │  StoreGateway   │  SQLite (WAL)
//! └─────────────────┘
//! ```
//!
//! The chain is the source of truth; the store is a derived, replayable view.

pub mod config;
pub mod error;
pub mod origin;
pub mod poller;
pub mod reconcile;
pub mod roles;
pub mod store;

// Re-export commonly used types at crate root
pub use config::Config;
pub use error::{Error, OriginError, ReconcileError, Result};
pub use origin::{LogFilter, Origin, RpcConfig, RpcOrigin};
pub use poller::{EntryCounts, FetchedBatch, PollConfig, PollLoop, PollState, PollStats};
pub use reconcile::{Applied, Reconciler};
pub use roles::RoleMap;
pub use store::{StoreGateway, StorePool};
