//! Decoded event field values.
//!
//! Decoding itself is done by `alloy-dyn-abi`; [`FieldValue`] is the owned,
//! comparable shape the rest of the mirror works with.

use std::fmt;

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256, Bytes, I256, U256};

/// A decoded event field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Address(Address),
    Bool(bool),
    Uint(U256),
    Int(I256),
    /// `bytesN`: the left-aligned word and its declared width.
    FixedBytes(B256, usize),
    Bytes(Bytes),
    String(String),
    /// Keccak hash of an indexed value that does not fit in a topic.
    Hash(B256),
    /// Array or tuple members, in order.
    List(Vec<FieldValue>),
}

impl From<DynSolValue> for FieldValue {
    fn from(value: DynSolValue) -> Self {
        match value {
            DynSolValue::Address(a) => Self::Address(a),
            DynSolValue::Bool(b) => Self::Bool(b),
            DynSolValue::Uint(v, _) => Self::Uint(v),
            DynSolValue::Int(v, _) => Self::Int(v),
            DynSolValue::FixedBytes(word, size) => Self::FixedBytes(word, size),
            DynSolValue::Function(f) => Self::Bytes(Bytes::copy_from_slice(f.as_slice())),
            DynSolValue::Bytes(b) => Self::Bytes(Bytes::from(b)),
            DynSolValue::String(s) => Self::String(s),
            DynSolValue::Array(items)
            | DynSolValue::FixedArray(items)
            | DynSolValue::Tuple(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(a) => write!(f, "{}", a.to_checksum(None)),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::FixedBytes(word, size) => {
                let size = (*size).min(word.len());
                write!(f, "0x{}", alloy_primitives::hex::encode(&word[..size]))
            }
            Self::Bytes(b) => write!(f, "0x{}", alloy_primitives::hex::encode(b)),
            Self::String(s) => f.write_str(s),
            Self::Hash(h) => write!(f, "{h}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_conversion_drops_width() {
        let value = FieldValue::from(DynSolValue::Uint(U256::from(3), 8));
        assert_eq!(value, FieldValue::Uint(U256::from(3)));

        let value = FieldValue::from(DynSolValue::Int(I256::MINUS_ONE, 8));
        assert_eq!(value, FieldValue::Int(I256::MINUS_ONE));
    }

    #[test]
    fn test_nested_values_become_lists() {
        let value = FieldValue::from(DynSolValue::Tuple(vec![
            DynSolValue::Array(vec![
                DynSolValue::Uint(U256::from(1), 256),
                DynSolValue::Uint(U256::from(2), 256),
            ]),
            DynSolValue::String("crate".to_string()),
        ]));

        assert_eq!(
            value,
            FieldValue::List(vec![
                FieldValue::List(vec![
                    FieldValue::Uint(U256::from(1)),
                    FieldValue::Uint(U256::from(2)),
                ]),
                FieldValue::String("crate".to_string()),
            ])
        );
        assert_eq!(value.to_string(), "[[1, 2], crate]");
    }

    #[test]
    fn test_display_formats() {
        let addr: Address = "0x5fbdb2315678afecb367f032d93f642f64180aa3".parse().unwrap();
        assert_eq!(
            FieldValue::Address(addr).to_string(),
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        );

        let mut word = B256::ZERO;
        word[0] = 0xab;
        word[1] = 0xcd;
        assert_eq!(FieldValue::FixedBytes(word, 2).to_string(), "0xabcd");
        assert_eq!(
            FieldValue::Bytes(Bytes::from_static(&[1, 2])).to_string(),
            "0x0102"
        );
    }
}
