//! The shared database handle
//!
//! One SQLite connection behind a mutex, cloned freely across the engine
//! and the inbound event handlers. Units of work that must be atomic go
//! through [`Database::transaction`]; everything else takes the lock for a
//! single statement through [`Database::with`].

use crate::error::{Result, StoreError};
use crate::migrations;
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Handle to the giveaway database
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database, used by tests
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Apply any pending schema migrations
    pub fn migrate(&self) -> Result<()> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        migrations::apply(&mut conn)
    }

    /// Run `f` with the connection locked
    pub fn with<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }

    /// Run `f` inside a transaction
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back when it
    /// returns `Err`; either way the connection lock is released.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "rolling back transaction");
                // Dropping the transaction rolls it back.
                Err(err)
            }
        }
    }
}
