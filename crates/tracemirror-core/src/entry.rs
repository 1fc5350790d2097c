//! Raw log entries as reported by the origin.

use alloy_primitives::{Address, B256, Bytes};

/// A log entry exactly as the chain node returned it.
///
/// `topics[0]` is the classification key for non-anonymous events. The
/// remaining topics and `data` are the raw field slots that the decoder
/// interprets against the matching event in the [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLogEntry {
    /// Contract that emitted the log.
    pub address: Address,
    /// Indexed topics, classification key first.
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed fields.
    pub data: Bytes,
    /// Hash of the transaction that emitted the log.
    pub tx_hash: B256,
    /// Block the log was included in.
    pub block_number: u64,
    /// Position of the log within its block.
    pub log_index: u64,
    /// Set by the node when the log was dropped by a reorg.
    pub removed: bool,
}

impl RawLogEntry {
    /// The schema fingerprint (topic0), if the log has any topics.
    pub fn classification_key(&self) -> Option<B256> {
        self.topics.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_key_is_first_topic() {
        let key = B256::repeat_byte(0xab);
        let entry = RawLogEntry {
            address: Address::ZERO,
            topics: vec![key, B256::ZERO],
            data: Bytes::new(),
            tx_hash: B256::ZERO,
            block_number: 1,
            log_index: 0,
            removed: false,
        };
        assert_eq!(entry.classification_key(), Some(key));
    }

    #[test]
    fn test_anonymous_log_has_no_key() {
        let entry = RawLogEntry {
            address: Address::ZERO,
            topics: Vec::new(),
            data: Bytes::new(),
            tx_hash: B256::ZERO,
            block_number: 1,
            log_index: 0,
            removed: false,
        };
        assert!(entry.classification_key().is_none());
    }
}
