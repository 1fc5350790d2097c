//! Read-side queries over the projections.
//!
//! These are what the serving layer consults before falling back to the
//! chain. Only [`backfill_role`] writes: it lets a reader store a role
//! membership it just confirmed on-chain.

use alloy_primitives::{Address, U256};
use rusqlite::{Connection, OptionalExtension, Result, params};

/// A row of `batches`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOverview {
    pub batch_id: String,
    pub metadata: String,
    pub current_owner: String,
    pub created_at: String,
}

/// A row of `stages`, without its surrogate id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRow {
    pub stage: i64,
    pub location: String,
    pub ts: String,
    pub actor: String,
}

/// Store representation of a batch identifier.
pub fn batch_key(batch_id: U256) -> String {
    batch_id.to_string()
}

/// Store representation of an account.
pub fn address_key(address: Address) -> String {
    address.to_checksum(None)
}

pub fn batch_overview(conn: &Connection, batch_id: U256) -> Result<Option<BatchOverview>> {
    conn.query_row(
        "SELECT batch_id, metadata, current_owner, created_at FROM batches WHERE batch_id = ?",
        [batch_key(batch_id)],
        |row| {
            Ok(BatchOverview {
                batch_id: row.get(0)?,
                metadata: row.get(1)?,
                current_owner: row.get(2)?,
                created_at: row.get(3)?,
            })
        },
    )
    .optional()
}

pub fn current_owner(conn: &Connection, batch_id: U256) -> Result<Option<String>> {
    conn.query_row(
        "SELECT current_owner FROM batches WHERE batch_id = ?",
        [batch_key(batch_id)],
        |row| row.get(0),
    )
    .optional()
}

/// The `index`-th stage of a batch, in the order stages were recorded.
pub fn stage(conn: &Connection, batch_id: U256, index: u64) -> Result<Option<StageRow>> {
    conn.query_row(
        "SELECT stage, location, ts, actor FROM stages
         WHERE batch_id = ?1 ORDER BY id LIMIT 1 OFFSET ?2",
        params![batch_key(batch_id), index as i64],
        stage_row,
    )
    .optional()
}

/// All stages of a batch, in the order they were recorded.
pub fn stages(conn: &Connection, batch_id: U256) -> Result<Vec<StageRow>> {
    let mut stmt = conn.prepare(
        "SELECT stage, location, ts, actor FROM stages WHERE batch_id = ? ORDER BY id",
    )?;
    let rows = stmt.query_map([batch_key(batch_id)], stage_row)?;
    rows.collect()
}

fn stage_row(row: &rusqlite::Row<'_>) -> Result<StageRow> {
    Ok(StageRow {
        stage: row.get(0)?,
        location: row.get(1)?,
        ts: row.get(2)?,
        actor: row.get(3)?,
    })
}

/// Role names currently held by `address`, sorted.
pub fn roles_of(conn: &Connection, address: Address) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT role_name FROM user_roles WHERE address = ? ORDER BY role_name")?;
    let rows = stmt.query_map([address_key(address)], |row| row.get(0))?;
    rows.collect()
}

/// Store a role membership confirmed against the chain.
///
/// Returns `true` if the row was new.
pub fn backfill_role(conn: &Connection, address: Address, role_name: &str) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO user_roles (address, role_name) VALUES (?1, ?2)
         ON CONFLICT (address, role_name) DO NOTHING",
        params![address_key(address), role_name],
    )?;
    Ok(inserted > 0)
}

/// Audited event names for a transaction.
pub fn audited_events(conn: &Connection, tx_hash: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT event_name FROM logs WHERE tx_hash = ? ORDER BY log_index")?;
    let rows = stmt.query_map([tx_hash], |row| row.get(0))?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::init_schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_missing_batch_is_none() {
        let conn = conn();
        assert_eq!(batch_overview(&conn, U256::from(1)).unwrap(), None);
        assert_eq!(current_owner(&conn, U256::from(1)).unwrap(), None);
        assert_eq!(stage(&conn, U256::from(1), 0).unwrap(), None);
    }

    #[test]
    fn test_stage_by_index() {
        let conn = conn();
        for (stage, location) in [(0, "Farm"), (1, "Depot")] {
            conn.execute(
                "INSERT INTO stages (batch_id, stage, location, ts, actor) VALUES ('5', ?1, ?2, 't', 'a')",
                params![stage, location],
            )
            .unwrap();
        }

        assert_eq!(stage(&conn, U256::from(5), 1).unwrap().unwrap().location, "Depot");
        assert_eq!(stage(&conn, U256::from(5), 2).unwrap(), None);
        assert_eq!(stages(&conn, U256::from(5)).unwrap().len(), 2);
    }

    #[test]
    fn test_backfill_role_is_idempotent() {
        let conn = conn();
        let account = Address::repeat_byte(0x31);

        assert!(backfill_role(&conn, account, "RETAILER_ROLE").unwrap());
        assert!(!backfill_role(&conn, account, "RETAILER_ROLE").unwrap());
        assert_eq!(roles_of(&conn, account).unwrap(), vec!["RETAILER_ROLE".to_string()]);
    }

    #[test]
    fn test_addresses_use_checksum_form() {
        let account: Address = "0x52908400098527886e0f7030069857d2e4169ee7".parse().unwrap();
        assert_eq!(address_key(account), "0x52908400098527886E0F7030069857D2E4169EE7");
    }
}
