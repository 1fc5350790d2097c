//! Chain origin adapters.
//!
//! The poll loop only talks to the chain through the [`Origin`] trait, so it
//! can be driven by the JSON-RPC client in production and by a scripted
//! origin in tests.
//!
//! # Available Origins
//!
//! - [`RpcOrigin`] - Ethereum JSON-RPC over HTTP (`eth_blockNumber`, `eth_getLogs`)

mod rpc;

pub use rpc::{RpcConfig, RpcOrigin};

use std::future::Future;

use alloy_primitives::Address;
use tracemirror_core::RawLogEntry;

use crate::error::OriginError;

/// Inclusive block range and source addresses for a log query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub from_block: u64,
    pub to_block: u64,
    pub addresses: Vec<Address>,
}

/// A source of raw log entries.
///
/// Entries may repeat across calls; consumers must tolerate replays.
pub trait Origin: Send + Sync {
    /// Human-readable name for this origin (used in logs).
    fn name(&self) -> &'static str;

    /// Latest block number known to the origin.
    fn block_number(&self) -> impl Future<Output = Result<u64, OriginError>> + Send;

    /// Log entries matching `filter`, in origin order.
    fn logs(
        &self,
        filter: &LogFilter,
    ) -> impl Future<Output = Result<Vec<RawLogEntry>, OriginError>> + Send;
}
