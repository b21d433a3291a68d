//! Connection pooling for the embedded `DuckDB` warehouse file.
//!
//! Aggregation traffic is read-heavy, so read-only and read-write
//! connections are pooled separately: analytic queries check out read-only
//! handles while ingestion takes the write side. A checked-out connection is
//! handed back to its pool on drop, which satisfies the warehouse contract
//! that every call releases its connection.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use duckdb::Connection;

/// Access mode requested when checking a connection out of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

struct PoolInner {
    db_path: PathBuf,
    max_idle: usize,
    idle: Mutex<IdleConnections>,
}

#[derive(Default)]
struct IdleConnections {
    read_only: Vec<Connection>,
    read_write: Vec<Connection>,
}

impl IdleConnections {
    fn take(&mut self, mode: AccessMode) -> Option<Connection> {
        match mode {
            AccessMode::ReadOnly => self.read_only.pop(),
            AccessMode::ReadWrite => self.read_write.pop(),
        }
    }

    fn put_back(&mut self, mode: AccessMode, connection: Connection, max_idle: usize) {
        let slot = match mode {
            AccessMode::ReadOnly => &mut self.read_only,
            AccessMode::ReadWrite => &mut self.read_write,
        };
        if slot.len() < max_idle {
            slot.push(connection);
        }
    }
}

/// Pool of `DuckDB` connections to the warehouse database file.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create a pool for the given database file, keeping at most
    /// `max_idle` idle connections per access mode.
    #[must_use]
    pub fn new(db_path: impl Into<PathBuf>, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                db_path: db_path.into(),
                max_idle: max_idle.max(1),
                idle: Mutex::new(IdleConnections::default()),
            }),
        }
    }

    /// Check a connection out of the pool, opening a fresh one when no idle
    /// connection of the requested mode is available.
    ///
    /// # Errors
    /// Returns an error if the database file cannot be opened or configured.
    ///
    /// # Panics
    /// Panics if the pool mutex is poisoned by a previous panic.
    pub fn checkout(&self, mode: AccessMode) -> Result<PooledConnection, duckdb::Error> {
        let reused = self
            .inner
            .idle
            .lock()
            .expect("warehouse connection pool mutex poisoned")
            .take(mode);

        let connection = match reused {
            Some(connection) => connection,
            None => open_configured(self.inner.db_path.as_path(), mode)?,
        };

        Ok(PooledConnection {
            mode,
            pool: Arc::clone(&self.inner),
            connection: Some(connection),
        })
    }

    /// Path of the backing database file.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.inner.db_path.as_path()
    }
}

/// A checked-out connection that rejoins the pool when dropped.
pub struct PooledConnection {
    mode: AccessMode,
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("pooled connection unexpectedly missing")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("pooled connection unexpectedly missing")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        self.pool
            .idle
            .lock()
            .expect("warehouse connection pool mutex poisoned")
            .put_back(self.mode, connection, self.pool.max_idle);
    }
}

fn open_configured(path: &Path, mode: AccessMode) -> Result<Connection, duckdb::Error> {
    let connection = Connection::open(path)?;
    connection.execute_batch("PRAGMA disable_progress_bar;")?;
    if mode == AccessMode::ReadOnly {
        // Best effort: older embedded versions reject this SET, and the
        // query layer enforces read-only semantics regardless.
        let _ = connection.execute_batch("SET access_mode = 'READ_ONLY';");
    }
    Ok(connection)
}
