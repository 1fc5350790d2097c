//! Role hash to role name mapping.
//!
//! Access-control events carry `keccak256(role_name)`, not the name. The
//! mapping is built once at startup from configuration entries, each either
//! a role name (hashed here) or an explicit `0x<hash>=NAME` pair for roles
//! whose identifier is not the hash of their name, such as the zero
//! `DEFAULT_ADMIN_ROLE`.

use std::collections::HashMap;

use alloy_primitives::{B256, keccak256};

use crate::{Error, Result};

/// Roles mirrored when nothing is configured.
pub const DEFAULT_ROLES: &[&str] = &["FARMER_ROLE", "INSPECTOR_ROLE", "RETAILER_ROLE"];

/// Lookup from role identifier to role name.
#[derive(Debug, Clone, Default)]
pub struct RoleMap {
    names: HashMap<B256, String>,
}

impl RoleMap {
    /// Build a mapping from configuration entries.
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let mut names = HashMap::new();

        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }

            let (hash, name) = match entry.split_once('=') {
                Some((hash, name)) => {
                    let hash: B256 = hash.trim().parse().map_err(|e| {
                        Error::Config(format!("invalid role hash in '{}': {}", entry, e))
                    })?;
                    (hash, name.trim())
                }
                None => (keccak256(entry.as_bytes()), entry),
            };

            if name.is_empty() {
                return Err(Error::Config(format!("role entry '{}' has no name", entry)));
            }
            names.insert(hash, name.to_string());
        }

        Ok(Self { names })
    }

    pub fn name_of(&self, role: &B256) -> Option<&str> {
        self.names.get(role).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
