//! Relational store boundary.
//!
//! - [`StorePool`] wraps a `deadpool-sqlite` pool of connections to one
//!   database file. It is created once by the daemon and handed to whoever
//!   needs store access; there is no global handle. Connections are used
//!   through `interact`, which runs the blocking SQLite work off the async
//!   runtime.
//! - [`StoreGateway`] runs one closure per batch inside a single transaction.
//!   An uncommitted transaction rolls back on drop and the connection goes
//!   back to the pool when the closure returns, so both are released on every
//!   exit path.
//! - [`queries`] holds the read-side queries used by the serving layer,
//!   normally run through [`StorePool::with_conn`].

mod cursor;
pub mod queries;
mod schema;

pub use cursor::{load_cursor, save_cursor};
pub use schema::{SCHEMA_VERSION, init_schema};

use std::path::Path;
use std::time::Duration;

use deadpool_sqlite::{Config as SqliteConfig, InteractError, Manager, Object, Pool, PoolError, Runtime};
use rusqlite::{Connection, Transaction};

use crate::error::ReconcileError;
use crate::{Error, Result};

/// Bounded pool of SQLite connections to one database file.
#[derive(Clone)]
pub struct StorePool {
    pool: Pool,
    acquire_timeout: Duration,
}

impl StorePool {
    /// Open a pool of up to `size` connections to the database at `path`,
    /// creating it and its schema if needed.
    pub async fn open(path: &Path, size: usize, acquire_timeout: Duration) -> Result<Self> {
        if size == 0 {
            return Err(Error::Config("store pool size must be at least 1".to_string()));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }

        let pool = Self::build(path, size, acquire_timeout)?;

        // WAL lets the serving side read while a batch is being written.
        // The journal mode is stored in the file, so one connection is enough.
        pool.with_conn(|conn| {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
            init_schema(conn)
        })
        .await
        .map_err(|e| Error::Database(format!("Failed to init store: {}", e)))?;

        tracing::info!(path = %path.display(), size, "store pool opened");

        Ok(pool)
    }

    /// Open a single-connection in-memory store (for testing).
    pub async fn open_in_memory() -> Result<Self> {
        let pool = Self::build(Path::new(":memory:"), 1, Duration::from_secs(1))?;

        pool.with_conn(|conn| init_schema(conn))
            .await
            .map_err(|e| Error::Database(format!("Failed to init schema: {}", e)))?;

        Ok(pool)
    }

    fn build(path: &Path, size: usize, acquire_timeout: Duration) -> Result<Self> {
        let manager = Manager::from_config(&SqliteConfig::new(path), Runtime::Tokio1);
        let pool = Pool::builder(manager)
            .max_size(size)
            .wait_timeout(Some(acquire_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| Error::Database(format!("Failed to build store pool: {}", e)))?;

        Ok(Self {
            pool,
            acquire_timeout,
        })
    }

    /// Take a connection, waiting up to the pool's acquire timeout.
    pub async fn get(&self) -> std::result::Result<Object, ReconcileError> {
        self.pool.get().await.map_err(|e| match e {
            PoolError::Timeout(_) => ReconcileError::PoolTimeout(self.acquire_timeout),
            other => ReconcileError::Pool(other.to_string()),
        })
    }

    /// Run `f` on a pooled connection.
    pub async fn with_conn<T, F>(&self, f: F) -> std::result::Result<T, ReconcileError>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.get().await?;
        let value = conn.interact(f).await.map_err(interact_failed)??;
        Ok(value)
    }

    /// Largest number of connections the pool will open.
    pub fn max_size(&self) -> usize {
        self.pool.status().max_size
    }
}

fn interact_failed(e: InteractError) -> ReconcileError {
    ReconcileError::Pool(format!("store task failed: {}", e))
}

/// Transactional boundary used by the poll loop.
#[derive(Clone)]
pub struct StoreGateway {
    pool: StorePool,
}

impl StoreGateway {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &StorePool {
        &self.pool
    }

    /// Run `f` inside one transaction and commit if it succeeds.
    ///
    /// Any error from `f` or from the commit leaves the store untouched.
    pub async fn with_batch<T, F>(&self, f: F) -> std::result::Result<T, ReconcileError>
    where
        F: FnOnce(&Transaction<'_>) -> std::result::Result<T, ReconcileError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await?;
        conn.interact(
            move |conn: &mut Connection| -> std::result::Result<T, ReconcileError> {
                let tx = conn.transaction()?;
                let value = f(&tx)?;
                tx.commit()?;
                Ok(value)
            },
        )
        .await
        .map_err(interact_failed)?
    }

    /// Last committed block, if any batch has ever been committed.
    pub async fn cursor(&self) -> std::result::Result<Option<u64>, ReconcileError> {
        self.pool.with_conn(|conn| load_cursor(conn)).await
    }
}
