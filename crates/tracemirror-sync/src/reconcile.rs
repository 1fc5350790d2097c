//! Projection of decoded events into the relational store.
//!
//! The [`Reconciler`] turns one [`DecodedEvent`] into store mutations on the
//! caller's transaction. Each entry is first claimed in `applied_entries`,
//! keyed by its position `(tx_hash, log_index)`. If the claim already existed,
//! nothing else is written, which makes [`Reconciler::apply`] idempotent for
//! every event kind, including the append-only stage history. Several entries
//! of the same event in one transaction are each applied once.
//!
//! The audit row in `logs` is written next, keyed by `(tx_hash, event_name)`;
//! a second entry with the same name in one transaction shares the first
//! one's audit row.
//!
//! # Projection rules
//!
//! | Event                  | Mutation                                        |
//! |------------------------|-------------------------------------------------|
//! | `BatchRegistered`      | upsert `batches`, overwriting metadata and owner |
//! | `OwnershipTransferred` | update `batches.current_owner` if the batch exists |
//! | `RoleGranted`          | insert into `user_roles`, ignoring duplicates   |
//! | `RoleRevoked`          | delete from `user_roles` if present             |
//! | `StageRecorded`        | append to `stages`                              |
//! | untracked / unknown    | audit row only                                  |

use rusqlite::{Connection, params};
use tracing::{debug, warn};
use tracemirror_core::{
    BatchRegistered, DecodedEvent, EventKind, OwnershipTransferred, RoleChange, StageRecorded,
};

use crate::error::ReconcileError;
use crate::roles::RoleMap;
use crate::store::queries::{address_key, batch_key};

/// What [`Reconciler::apply`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Audit row written and projection updated.
    Projected,
    /// Audit row written; the event has no projection or the projection had
    /// nothing to touch.
    AuditOnly,
    /// The entry was already claimed; nothing was written.
    Replayed,
    /// Audit row written; the role hash is not in the configured mapping.
    SkippedUnknownRole,
}

impl Applied {
    /// Stable label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Projected => "projected",
            Self::AuditOnly => "audit_only",
            Self::Replayed => "replayed",
            Self::SkippedUnknownRole => "skipped_unknown_role",
        }
    }
}

/// Applies decoded events to the store.
#[derive(Debug, Clone)]
pub struct Reconciler {
    roles: RoleMap,
}

impl Reconciler {
    pub fn new(roles: RoleMap) -> Self {
        Self { roles }
    }

    /// Apply one event on `conn`, normally the batch transaction.
    ///
    /// Only store errors are returned; unknown events and unmapped roles are
    /// ordinary outcomes.
    pub fn apply(&self, event: &DecodedEvent, conn: &Connection) -> Result<Applied, ReconcileError> {
        if !claim_entry(conn, event)? {
            debug!(
                tx_hash = %event.tx_hash,
                log_index = event.log_index,
                event = %event.name,
                "replayed entry, skipping projection"
            );
            return Ok(Applied::Replayed);
        }
        record_audit(conn, event)?;

        let applied = match &event.kind {
            EventKind::BatchRegistered(batch) => register_batch(conn, batch)?,
            EventKind::OwnershipTransferred(transfer) => transfer_ownership(conn, transfer)?,
            EventKind::RoleGranted(change) => self.grant_role(conn, change)?,
            EventKind::RoleRevoked(change) => self.revoke_role(conn, change)?,
            EventKind::StageRecorded(stage) => record_stage(conn, stage)?,
            EventKind::Untracked | EventKind::Unknown => Applied::AuditOnly,
        };

        debug!(
            tx_hash = %event.tx_hash,
            block = event.block_number,
            log_index = event.log_index,
            event = %event.name,
            outcome = applied.as_str(),
            "applied event"
        );

        Ok(applied)
    }

    fn grant_role(&self, conn: &Connection, change: &RoleChange) -> Result<Applied, ReconcileError> {
        let Some(role_name) = self.role_name(change) else {
            return Ok(Applied::SkippedUnknownRole);
        };

        conn.execute(
            "INSERT INTO user_roles (address, role_name) VALUES (?1, ?2)
             ON CONFLICT (address, role_name) DO NOTHING",
            params![address_key(change.account), role_name],
        )?;
        Ok(Applied::Projected)
    }

    fn revoke_role(&self, conn: &Connection, change: &RoleChange) -> Result<Applied, ReconcileError> {
        let Some(role_name) = self.role_name(change) else {
            return Ok(Applied::SkippedUnknownRole);
        };

        let removed = conn.execute(
            "DELETE FROM user_roles WHERE address = ?1 AND role_name = ?2",
            params![address_key(change.account), role_name],
        )?;
        Ok(if removed > 0 {
            Applied::Projected
        } else {
            Applied::AuditOnly
        })
    }

    fn role_name(&self, change: &RoleChange) -> Option<&str> {
        let name = self.roles.name_of(&change.role);
        if name.is_none() {
            warn!(
                role = %change.role,
                account = %change.account,
                "unrecognized role hash, skipping"
            );
        }
        name
    }
}

/// Mark the entry as applied. Returns `false` if it already was.
fn claim_entry(conn: &Connection, event: &DecodedEvent) -> Result<bool, ReconcileError> {
    let inserted = conn.execute(
        "INSERT INTO applied_entries (tx_hash, log_index, block_number)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (tx_hash, log_index) DO NOTHING",
        params![
            event.tx_hash.to_string(),
            event.log_index as i64,
            event.block_number as i64
        ],
    )?;
    Ok(inserted > 0)
}

fn record_audit(conn: &Connection, event: &DecodedEvent) -> Result<(), ReconcileError> {
    conn.execute(
        "INSERT INTO logs (tx_hash, event_name, block_number, log_index)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (tx_hash, event_name) DO NOTHING",
        params![
            event.tx_hash.to_string(),
            event.name,
            event.block_number as i64,
            event.log_index as i64
        ],
    )?;
    Ok(())
}

fn register_batch(conn: &Connection, batch: &BatchRegistered) -> Result<Applied, ReconcileError> {
    conn.execute(
        "INSERT INTO batches (batch_id, metadata, current_owner) VALUES (?1, ?2, ?3)
         ON CONFLICT (batch_id) DO UPDATE SET
            metadata = excluded.metadata,
            current_owner = excluded.current_owner",
        params![
            batch_key(batch.batch_id),
            batch.metadata,
            address_key(batch.owner)
        ],
    )?;
    Ok(Applied::Projected)
}

fn transfer_ownership(
    conn: &Connection,
    transfer: &OwnershipTransferred,
) -> Result<Applied, ReconcileError> {
    let updated = conn.execute(
        "UPDATE batches SET current_owner = ?2 WHERE batch_id = ?1",
        params![batch_key(transfer.batch_id), address_key(transfer.new_owner)],
    )?;

    if updated == 0 {
        warn!(batch_id = %transfer.batch_id, "ownership transfer for unknown batch");
        return Ok(Applied::AuditOnly);
    }
    Ok(Applied::Projected)
}

fn record_stage(conn: &Connection, stage: &StageRecorded) -> Result<Applied, ReconcileError> {
    conn.execute(
        "INSERT INTO stages (batch_id, stage, location, ts, actor) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            batch_key(stage.batch_id),
            stage.stage as i64,
            stage.location,
            stage.timestamp.to_rfc3339(),
            address_key(stage.actor)
        ],
    )?;
    Ok(Applied::Projected)
}
