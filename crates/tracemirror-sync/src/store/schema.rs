//! SQLite schema for the mirrored projections.
//!
//! This module defines the tables the reconciler writes and the serving side
//! reads, and tracks the schema version.

use rusqlite::{Connection, OptionalExtension, Result};

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema.
///
/// Creates all tables if they don't exist and runs any pending migrations.
/// Safe to call on every open.
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        migrate(conn, current_version, SCHEMA_VERSION)?;
    } else if current_version > SCHEMA_VERSION {
        tracing::warn!(
            found = current_version,
            supported = SCHEMA_VERSION,
            "store was written by a newer version"
        );
    }

    Ok(())
}

/// Get the current schema version (0 if not initialized).
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

fn migrate(conn: &Connection, from: i32, to: i32) -> Result<()> {
    for version in from..to {
        if version == 1 {
            migrate_v1_to_v2(conn)?;
        }
    }
    set_schema_version(conn, to)?;
    Ok(())
}

/// Migrate from v1 to v2: replay guard keyed by log position instead of
/// event name. Entries already audited count as applied.
fn migrate_v1_to_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS applied_entries (
            tx_hash TEXT NOT NULL,
            log_index INTEGER NOT NULL,
            block_number INTEGER NOT NULL,
            PRIMARY KEY (tx_hash, log_index)
        );

        INSERT OR IGNORE INTO applied_entries (tx_hash, log_index, block_number)
            SELECT tx_hash, log_index, block_number FROM logs;
        "#,
    )?;
    Ok(())
}

/// Create all tables for a fresh database.
fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per registered batch; owner follows custody events
        CREATE TABLE IF NOT EXISTS batches (
            batch_id TEXT PRIMARY KEY,
            metadata TEXT NOT NULL,
            current_owner TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        -- Append-only stage history; id gives insertion order
        CREATE TABLE IF NOT EXISTS stages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id TEXT NOT NULL,
            stage INTEGER NOT NULL,
            location TEXT NOT NULL,
            ts TEXT NOT NULL,
            actor TEXT NOT NULL
        );

        -- Current role membership only
        CREATE TABLE IF NOT EXISTS user_roles (
            address TEXT NOT NULL,
            role_name TEXT NOT NULL,
            granted_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (address, role_name)
        );

        -- Audit trail, one row per (transaction, event name)
        CREATE TABLE IF NOT EXISTS logs (
            tx_hash TEXT NOT NULL,
            event_name TEXT NOT NULL,
            block_number INTEGER NOT NULL,
            log_index INTEGER NOT NULL,
            recorded_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (tx_hash, event_name)
        );

        -- Replay guard: every log entry ever applied
        CREATE TABLE IF NOT EXISTS applied_entries (
            tx_hash TEXT NOT NULL,
            log_index INTEGER NOT NULL,
            block_number INTEGER NOT NULL,
            PRIMARY KEY (tx_hash, log_index)
        );

        -- Last committed block per cursor key
        CREATE TABLE IF NOT EXISTS sync_cursor (
            key TEXT PRIMARY KEY,
            block_number INTEGER NOT NULL,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_stages_batch ON stages(batch_id, id);
        CREATE INDEX IF NOT EXISTS idx_user_roles_address ON user_roles(address);
        CREATE INDEX IF NOT EXISTS idx_logs_block ON logs(block_number);
        "#,
    )?;

    Ok(())
}
