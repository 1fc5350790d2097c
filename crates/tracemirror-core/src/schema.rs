//! Event schema registry.
//!
//! Schemas come from contract ABI files: either a bare JSON array or a
//! compiled artifact with an `abi` array. Each non-anonymous event is keyed
//! by its selector:
//!
//! ```text
//! keccak256("StageRecorded(uint256,uint8,string,uint256,address)")
//! ```
//!
//! The registry is immutable once loaded and is shared between tasks behind
//! an `Arc` without locking.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use alloy_json_abi::{Event, JsonAbi};
use alloy_primitives::B256;

use crate::error::SchemaLoadError;

/// Read-only index of event schemas by classification key.
#[derive(Debug, Default)]
pub struct Registry {
    events: HashMap<B256, Event>,
}

impl Registry {
    /// Load every event declared in the given ABI files.
    ///
    /// Fails if any file is missing, is not JSON, or is not an ABI
    /// description. Events of any parameter type are accepted.
    pub fn load<P>(paths: &[P]) -> Result<Self, SchemaLoadError>
    where
        P: AsRef<Path>,
    {
        let mut registry = Self::default();
        for path in paths {
            let path = path.as_ref();
            let loaded = load_file(path)?;
            tracing::info!(path = %path.display(), events = loaded.len(), "loaded event schemas");
            registry.extend(loaded);
        }
        Ok(registry)
    }

    /// Build a registry from events already in memory.
    pub fn from_events(events: impl IntoIterator<Item = Event>) -> Self {
        let mut registry = Self::default();
        registry.extend(events);
        registry
    }

    fn extend(&mut self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            if event.anonymous {
                tracing::debug!(event = %event.name, "skipping anonymous event");
                continue;
            }
            let key = event.selector();
            if self.events.contains_key(&key) {
                tracing::debug!(signature = %event.signature(), "duplicate event schema ignored");
                continue;
            }
            self.events.insert(key, event);
        }
    }

    /// Find the event for a classification key.
    pub fn lookup(&self, key: &B256) -> Option<&Event> {
        self.events.get(key)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Parse one ABI file into its events.
fn load_file(path: &Path) -> Result<Vec<Event>, SchemaLoadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SchemaLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let json: serde_json::Value =
        serde_json::from_str(&contents).map_err(|source| SchemaLoadError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    // Bare ABI array, or an artifact object carrying one under "abi".
    let abi = match json {
        serde_json::Value::Array(_) => json,
        serde_json::Value::Object(mut obj) => {
            obj.remove("abi").ok_or_else(|| malformed(path, "missing 'abi' array"))?
        }
        _ => return Err(malformed(path, "expected an array or an object")),
    };

    let abi: JsonAbi = serde_json::from_value(abi)
        .map_err(|e| malformed(path, format!("invalid ABI: {}", e)))?;

    Ok(abi.events().cloned().collect())
}

fn malformed(path: &Path, reason: impl Into<String>) -> SchemaLoadError {
    SchemaLoadError::Malformed {
        path: PathBuf::from(path),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ACCESS_CONTROL_ABI: &str = r#"[
        {"type": "function", "name": "grantRole", "inputs": [], "outputs": [], "stateMutability": "nonpayable"},
        {"type": "event", "name": "RoleGranted", "anonymous": false, "inputs": [
            {"name": "role", "type": "bytes32", "indexed": true},
            {"name": "account", "type": "address", "indexed": true},
            {"name": "sender", "type": "address", "indexed": true}
        ]}
    ]"#;

    fn write_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_selector_matches_known_topic() {
        // OpenZeppelin AccessControl RoleGranted topic0.
        let file = write_file(ACCESS_CONTROL_ABI);
        let registry = Registry::load(&[file.path()]).unwrap();
        assert_eq!(registry.len(), 1);

        let key: B256 = "0x2f8788117e7eff1d82e926ec794901d17c78024a50270940304540a733656f0d"
            .parse()
            .unwrap();
        let event = registry.lookup(&key).unwrap();
        assert_eq!(event.name, "RoleGranted");
        assert_eq!(event.signature(), "RoleGranted(bytes32,address,address)");
        assert_eq!(event.inputs.iter().filter(|p| p.indexed).count(), 3);
    }

    #[test]
    fn test_load_artifact_object() {
        let artifact = format!(r#"{{"contractName": "PermissionControl", "abi": {}}}"#, ACCESS_CONTROL_ABI);
        let file = write_file(&artifact);
        let registry = Registry::load(&[file.path()]).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_file_fails() {
        let err = Registry::load(&["/nonexistent/abi.json"]).unwrap_err();
        assert!(matches!(err, SchemaLoadError::Io { .. }));
    }

    #[test]
    fn test_invalid_json_fails() {
        let file = write_file("{not json");
        let err = Registry::load(&[file.path()]).unwrap_err();
        assert!(matches!(err, SchemaLoadError::Json { .. }));
    }

    #[test]
    fn test_object_without_abi_fails() {
        let file = write_file(r#"{"bytecode": "0x"}"#);
        let err = Registry::load(&[file.path()]).unwrap_err();
        assert!(matches!(err, SchemaLoadError::Malformed { .. }));
    }

    #[test]
    fn test_array_and_tuple_params_load() {
        let file = write_file(
            r#"[
                {"type": "event", "name": "BatchesMerged", "anonymous": false, "inputs": [
                    {"name": "ids", "type": "uint256[]", "indexed": false},
                    {"name": "origin", "type": "tuple", "indexed": false, "components": [
                        {"name": "lat", "type": "int32"},
                        {"name": "lon", "type": "int32"}
                    ]}
                ]},
                {"type": "event", "name": "Paused", "anonymous": false, "inputs": [
                    {"name": "account", "type": "address", "indexed": false}
                ]}
            ]"#,
        );
        let registry = Registry::load(&[file.path()]).unwrap();
        assert_eq!(registry.len(), 2);

        let key = keccak256("BatchesMerged(uint256[],(int32,int32))".as_bytes());
        assert_eq!(registry.lookup(&key).unwrap().name, "BatchesMerged");
        assert!(registry.lookup(&keccak256("Paused(address)".as_bytes())).is_some());
    }

    #[test]
    fn test_anonymous_events_skipped() {
        let file = write_file(
            r#"[{"type": "event", "name": "Ping", "anonymous": true, "inputs": []}]"#,
        );
        let registry = Registry::load(&[file.path()]).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_schemas_across_files() {
        let a = write_file(ACCESS_CONTROL_ABI);
        let b = write_file(ACCESS_CONTROL_ABI);
        let registry = Registry::load(&[a.path(), b.path()]).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_from_events() {
        let registry = Registry::from_events([
            Event::parse("event Tick(uint256)").unwrap(),
            Event::parse("event Tick(uint256 value)").unwrap(),
        ]);
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(&keccak256("Tick(uint256)".as_bytes())).is_some());
    }
}
