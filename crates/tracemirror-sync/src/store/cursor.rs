//! Persistent block cursor.
//!
//! The cursor is written in the same transaction as the batch it covers, so
//! a rolled-back batch leaves it where it was and the range is fetched again.

use rusqlite::{Connection, OptionalExtension, Result, params};

const LOGS_CURSOR: &str = "logs";

/// Last block whose entries were committed.
pub fn load_cursor(conn: &Connection) -> Result<Option<u64>> {
    let block: Option<i64> = conn
        .query_row(
            "SELECT block_number FROM sync_cursor WHERE key = ?",
            [LOGS_CURSOR],
            |row| row.get(0),
        )
        .optional()?;

    Ok(block.map(|b| b as u64))
}

/// Record `block` as the last committed block.
pub fn save_cursor(conn: &Connection, block: u64) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_cursor (key, block_number, updated_at)
         VALUES (?1, ?2, CURRENT_TIMESTAMP)
         ON CONFLICT(key) DO UPDATE SET
            block_number = excluded.block_number,
            updated_at = excluded.updated_at",
        params![LOGS_CURSOR, block as i64],
    )?;
    Ok(())
}
