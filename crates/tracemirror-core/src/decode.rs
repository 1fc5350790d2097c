//! Log classification and decoding.
//!
//! [`decode`] resolves a [`RawLogEntry`] against the [`Registry`] and yields a
//! [`DecodedEvent`]. Three outcomes matter to callers:
//!
//! - unrecognized classification key: `Ok` with [`EventKind::Unknown`];
//!   the entry is still audited but projects nothing
//! - fields do not match the schema: `Err(DecodeError)`; the entry is skipped
//! - otherwise `Ok` with a typed [`EventKind`] payload
//!
//! Topics and data are decoded with `alloy-dyn-abi`, then re-joined into
//! declaration order and keyed by parameter name. Indexed strings, bytes,
//! arrays and tuples only carry their hash in a topic and decode to
//! [`FieldValue::Hash`].

use std::collections::BTreeMap;

use alloy_dyn_abi::{DynSolValue, EventExt};
use alloy_json_abi::Event;
use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};

use crate::abi::FieldValue;
use crate::entry::RawLogEntry;
use crate::error::DecodeError;
use crate::schema::Registry;

/// Audit name for entries with no matching schema.
pub const UNKNOWN_EVENT: &str = "Unknown";

/// Decoded fields by parameter name.
pub type EventFields = BTreeMap<String, FieldValue>;

/// A log entry after classification and decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    /// Event name from the schema, or [`UNKNOWN_EVENT`].
    pub name: String,
    pub kind: EventKind,
    pub fields: EventFields,
    pub address: Address,
    pub tx_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
}

/// Event kinds the mirror knows how to project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    BatchRegistered(BatchRegistered),
    OwnershipTransferred(OwnershipTransferred),
    RoleGranted(RoleChange),
    RoleRevoked(RoleChange),
    StageRecorded(StageRecorded),
    /// Known schema without a projection rule.
    Untracked,
    /// No schema matched the classification key.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRegistered {
    pub batch_id: U256,
    pub owner: Address,
    pub metadata: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipTransferred {
    pub batch_id: U256,
    pub new_owner: Address,
}

/// Payload shared by role grants and revocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChange {
    /// keccak256 of the role name.
    pub role: B256,
    pub account: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecorded {
    pub batch_id: U256,
    pub stage: u64,
    pub location: String,
    pub timestamp: DateTime<Utc>,
    pub actor: Address,
}

/// Classify and decode a raw log entry.
pub fn decode(entry: &RawLogEntry, registry: &Registry) -> Result<DecodedEvent, DecodeError> {
    let event = entry
        .classification_key()
        .and_then(|key| registry.lookup(&key));

    let Some(event) = event else {
        return Ok(DecodedEvent {
            name: UNKNOWN_EVENT.to_string(),
            kind: EventKind::Unknown,
            fields: EventFields::new(),
            address: entry.address,
            tx_hash: entry.tx_hash,
            block_number: entry.block_number,
            log_index: entry.log_index,
        });
    };

    let decoded = event
        .decode_log_parts(entry.topics.iter().copied(), &entry.data, true)
        .map_err(|e| DecodeError::Abi {
            event: event.name.clone(),
            reason: e.to_string(),
        })?;
    let fields = named_fields(event, decoded.indexed, decoded.body);
    let kind = project(&event.name, &fields)?;

    Ok(DecodedEvent {
        name: event.name.clone(),
        kind,
        fields,
        address: entry.address,
        tx_hash: entry.tx_hash,
        block_number: entry.block_number,
        log_index: entry.log_index,
    })
}

/// Re-join indexed and body values in declaration order.
///
/// Unnamed parameters are keyed by position, e.g. `_0`.
fn named_fields(event: &Event, indexed: Vec<DynSolValue>, body: Vec<DynSolValue>) -> EventFields {
    let mut indexed = indexed.into_iter();
    let mut body = body.into_iter();
    let mut fields = EventFields::new();

    for (position, param) in event.inputs.iter().enumerate() {
        let value = if param.indexed {
            indexed.next().map(|value| match value {
                DynSolValue::FixedBytes(word, _) if hashed_in_topic(&param.ty) => {
                    FieldValue::Hash(word)
                }
                other => other.into(),
            })
        } else {
            body.next().map(FieldValue::from)
        };
        let Some(value) = value else { break };

        let name = if param.name.is_empty() {
            format!("_{position}")
        } else {
            param.name.clone()
        };
        fields.insert(name, value);
    }

    fields
}

/// Reference types are stored in a topic as the keccak hash of their encoding.
fn hashed_in_topic(ty: &str) -> bool {
    ty == "string" || ty == "bytes" || ty.ends_with(']') || ty.starts_with("tuple")
}

/// Map a decoded event onto the closed set of projected kinds.
fn project(name: &str, fields: &EventFields) -> Result<EventKind, DecodeError> {
    let get = FieldReader { event: name, fields };

    let kind = match name {
        "BatchRegistered" => EventKind::BatchRegistered(BatchRegistered {
            batch_id: get.uint("batchId")?,
            owner: get.address_any(&["farmer", "owner"])?,
            metadata: get.string("metadata")?,
        }),
        "OwnershipTransferred" => EventKind::OwnershipTransferred(OwnershipTransferred {
            batch_id: get.uint("batchId")?,
            new_owner: get.address("newOwner")?,
        }),
        "StageRecorded" => EventKind::StageRecorded(StageRecorded {
            batch_id: get.uint("batchId")?,
            stage: get.u64("stage")?,
            location: get.string("location")?,
            timestamp: get.timestamp("timestamp")?,
            actor: get.address("actor")?,
        }),
        _ if name.starts_with("RoleGranted") => EventKind::RoleGranted(get.role_change()?),
        _ if name.starts_with("RoleRevoked") => EventKind::RoleRevoked(get.role_change()?),
        _ => EventKind::Untracked,
    };

    Ok(kind)
}

/// Typed field access with errors that name the event and field.
struct FieldReader<'a> {
    event: &'a str,
    fields: &'a EventFields,
}

impl FieldReader<'_> {
    fn value(&self, field: &str) -> Result<&FieldValue, DecodeError> {
        self.fields.get(field).ok_or_else(|| DecodeError::MissingField {
            event: self.event.to_string(),
            field: field.to_string(),
        })
    }

    fn wrong_type(&self, field: &str, expected: &'static str) -> DecodeError {
        DecodeError::FieldType {
            event: self.event.to_string(),
            field: field.to_string(),
            expected,
        }
    }

    fn uint(&self, field: &str) -> Result<U256, DecodeError> {
        match self.value(field)? {
            FieldValue::Uint(v) => Ok(*v),
            _ => Err(self.wrong_type(field, "uint")),
        }
    }

    fn u64(&self, field: &str) -> Result<u64, DecodeError> {
        let value = self.uint(field)?;
        if value > U256::from(u64::MAX) {
            return Err(DecodeError::OutOfRange {
                event: self.event.to_string(),
                field: field.to_string(),
            });
        }
        Ok(value.to::<u64>())
    }

    fn timestamp(&self, field: &str) -> Result<DateTime<Utc>, DecodeError> {
        let out_of_range = || DecodeError::OutOfRange {
            event: self.event.to_string(),
            field: field.to_string(),
        };
        let secs = i64::try_from(self.u64(field)?).map_err(|_| out_of_range())?;
        DateTime::from_timestamp(secs, 0).ok_or_else(out_of_range)
    }

    fn address(&self, field: &str) -> Result<Address, DecodeError> {
        match self.value(field)? {
            FieldValue::Address(a) => Ok(*a),
            _ => Err(self.wrong_type(field, "address")),
        }
    }

    /// First present field among `candidates`.
    fn address_any(&self, candidates: &[&str]) -> Result<Address, DecodeError> {
        let field = candidates
            .iter()
            .find(|name| self.fields.contains_key(**name))
            .unwrap_or(&candidates[0]);
        self.address(field)
    }

    fn string(&self, field: &str) -> Result<String, DecodeError> {
        match self.value(field)? {
            FieldValue::String(s) => Ok(s.clone()),
            _ => Err(self.wrong_type(field, "string")),
        }
    }

    fn bytes32(&self, field: &str) -> Result<B256, DecodeError> {
        match self.value(field)? {
            FieldValue::FixedBytes(word, 32) => Ok(*word),
            _ => Err(self.wrong_type(field, "bytes32")),
        }
    }

    fn role_change(&self) -> Result<RoleChange, DecodeError> {
        Ok(RoleChange {
            role: self.bytes32("role")?,
            account: self.address("account")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Bytes, keccak256};

    fn stage_event() -> Event {
        Event::parse(
            "event StageRecorded(uint256 indexed batchId, uint8 stage, string location, uint256 timestamp, address actor)",
        )
        .unwrap()
    }

    fn role_granted_event() -> Event {
        Event::parse(
            "event RoleGranted(bytes32 indexed role, address indexed account, address indexed sender)",
        )
        .unwrap()
    }

    fn uint_word(v: u64) -> B256 {
        B256::from(U256::from(v).to_be_bytes::<32>())
    }

    fn encode(values: Vec<DynSolValue>) -> Bytes {
        Bytes::from(DynSolValue::Tuple(values).abi_encode_params())
    }

    fn stage_data(stage: u64, location: &str, ts: u64, actor: Address) -> Bytes {
        encode(vec![
            DynSolValue::Uint(U256::from(stage), 8),
            DynSolValue::String(location.to_string()),
            DynSolValue::Uint(U256::from(ts), 256),
            DynSolValue::Address(actor),
        ])
    }

    fn entry(topics: Vec<B256>, data: Bytes) -> RawLogEntry {
        RawLogEntry {
            address: Address::repeat_byte(0xcc),
            topics,
            data,
            tx_hash: B256::repeat_byte(0x01),
            block_number: 100,
            log_index: 3,
            removed: false,
        }
    }

    #[test]
    fn test_decode_stage_recorded() {
        let event = stage_event();
        let registry = Registry::from_events([event.clone()]);
        let actor = Address::repeat_byte(0x42);

        let raw = entry(
            vec![event.selector(), uint_word(7)],
            stage_data(2, "Warehouse 9", 1_700_000_000, actor),
        );
        let decoded = decode(&raw, &registry).unwrap();

        assert_eq!(decoded.name, "StageRecorded");
        assert_eq!(decoded.block_number, 100);
        assert_eq!(decoded.log_index, 3);
        match decoded.kind {
            EventKind::StageRecorded(stage) => {
                assert_eq!(stage.batch_id, U256::from(7));
                assert_eq!(stage.stage, 2);
                assert_eq!(stage.location, "Warehouse 9");
                assert_eq!(stage.timestamp.timestamp(), 1_700_000_000);
                assert_eq!(stage.actor, actor);
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert_eq!(
            decoded.fields.get("location"),
            Some(&FieldValue::String("Warehouse 9".to_string()))
        );
    }

    #[test]
    fn test_unknown_key_is_not_an_error() {
        let registry = Registry::from_events([stage_event()]);
        let raw = entry(vec![keccak256(b"Mystery()")], Bytes::new());

        let decoded = decode(&raw, &registry).unwrap();
        assert_eq!(decoded.kind, EventKind::Unknown);
        assert_eq!(decoded.name, UNKNOWN_EVENT);
        assert!(decoded.fields.is_empty());
        assert_eq!(decoded.tx_hash, raw.tx_hash);
    }

    #[test]
    fn test_log_without_topics_is_unknown() {
        let registry = Registry::from_events([stage_event()]);
        let decoded = decode(&entry(Vec::new(), Bytes::new()), &registry).unwrap();
        assert_eq!(decoded.kind, EventKind::Unknown);
    }

    #[test]
    fn test_topic_count_mismatch() {
        let event = role_granted_event();
        let registry = Registry::from_events([event.clone()]);
        let raw = entry(vec![event.selector(), B256::ZERO], Bytes::new());

        let err = decode(&raw, &registry).unwrap_err();
        assert!(matches!(err, DecodeError::Abi { ref event, .. } if event == "RoleGranted"));
    }

    #[test]
    fn test_short_data() {
        let event = stage_event();
        let registry = Registry::from_events([event.clone()]);
        let raw = entry(vec![event.selector(), uint_word(7)], Bytes::from(vec![0u8; 64]));

        let err = decode(&raw, &registry).unwrap_err();
        assert!(matches!(err, DecodeError::Abi { .. }));
    }

    #[test]
    fn test_role_granted_payload() {
        let event = role_granted_event();
        let registry = Registry::from_events([event.clone()]);
        let role = keccak256(b"INSPECTOR_ROLE");
        let account = Address::repeat_byte(0x07);

        let raw = entry(
            vec![event.selector(), role, account.into_word(), Address::ZERO.into_word()],
            Bytes::new(),
        );
        let decoded = decode(&raw, &registry).unwrap();
        assert_eq!(decoded.kind, EventKind::RoleGranted(RoleChange { role, account }));
    }

    #[test]
    fn test_projected_field_with_wrong_type() {
        // A RoleGranted declared with a uint role cannot be projected.
        let event = Event::parse("event RoleGranted(uint256 indexed role, address indexed account)")
            .unwrap();
        let registry = Registry::from_events([event.clone()]);
        let raw = entry(
            vec![event.selector(), uint_word(1), Address::ZERO.into_word()],
            Bytes::new(),
        );

        let err = decode(&raw, &registry).unwrap_err();
        assert!(matches!(err, DecodeError::FieldType { expected: "bytes32", .. }));
    }

    #[test]
    fn test_untracked_schema() {
        let event = Event::parse("event Paused(address account)").unwrap();
        let registry = Registry::from_events([event.clone()]);
        let raw = entry(
            vec![event.selector()],
            encode(vec![DynSolValue::Address(Address::repeat_byte(1))]),
        );

        let decoded = decode(&raw, &registry).unwrap();
        assert_eq!(decoded.kind, EventKind::Untracked);
        assert_eq!(decoded.name, "Paused");
    }

    #[test]
    fn test_array_and_indexed_string_fields() {
        let event = Event::parse(
            "event BatchesMerged(string indexed site, uint256[] ids, (int32,int32) origin)",
        )
        .unwrap();
        let registry = Registry::from_events([event.clone()]);
        let site = keccak256(b"Depot 4");

        let raw = entry(
            vec![event.selector(), site],
            encode(vec![
                DynSolValue::Array(vec![
                    DynSolValue::Uint(U256::from(7), 256),
                    DynSolValue::Uint(U256::from(9), 256),
                ]),
                DynSolValue::Tuple(vec![
                    DynSolValue::Int(alloy_primitives::I256::try_from(-3i64).unwrap(), 32),
                    DynSolValue::Int(alloy_primitives::I256::try_from(5i64).unwrap(), 32),
                ]),
            ]),
        );

        let decoded = decode(&raw, &registry).unwrap();
        assert_eq!(decoded.kind, EventKind::Untracked);
        assert_eq!(decoded.fields.get("site"), Some(&FieldValue::Hash(site)));
        assert_eq!(
            decoded.fields.get("ids"),
            Some(&FieldValue::List(vec![
                FieldValue::Uint(U256::from(7)),
                FieldValue::Uint(U256::from(9)),
            ]))
        );
        assert_eq!(decoded.fields.get("origin").unwrap().to_string(), "[-3, 5]");
    }

    #[test]
    fn test_unnamed_params_get_positional_names() {
        let event = Event::parse("event Tick(uint256)").unwrap();
        let registry = Registry::from_events([event.clone()]);
        let raw = entry(
            vec![event.selector()],
            encode(vec![DynSolValue::Uint(U256::from(11), 256)]),
        );

        let decoded = decode(&raw, &registry).unwrap();
        assert_eq!(decoded.fields.get("_0"), Some(&FieldValue::Uint(U256::from(11))));
    }

    #[test]
    fn test_batch_registered_accepts_owner_alias() {
        let event = Event::parse(
            "event BatchRegistered(uint256 indexed batchId, address indexed owner, string metadata)",
        )
        .unwrap();
        let registry = Registry::from_events([event.clone()]);
        let owner = Address::repeat_byte(0x0a);

        let raw = entry(
            vec![event.selector(), uint_word(42), owner.into_word()],
            encode(vec![DynSolValue::String(String::new())]),
        );

        let decoded = decode(&raw, &registry).unwrap();
        assert_eq!(
            decoded.kind,
            EventKind::BatchRegistered(BatchRegistered {
                batch_id: U256::from(42),
                owner,
                metadata: String::new(),
            })
        );
    }
}
