#![forbid(unsafe_code)]

//! Embedded SQLite storage for the L-Core attestation engine.
//!
//! A [`Store`] owns one connection to an in-memory database (the host owns
//! durability through snapshots). All mutations happen inside the handler of
//! a single advance request; between requests the store is quiescent, so
//! there is no locking. Cascades are declared in the schema: a bucket entry
//! or data chunk exists only while its parent attestation does.

pub mod attestations;
pub mod discovery;
pub mod grants;
pub mod identity;
pub mod registry;
pub mod schema;
pub mod snapshot;

use lcore_types::error::StorageError;
use lcore_types::InputIndex;
use rusqlite::Connection;

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Maps a driver error onto the storage taxonomy.
pub(crate) fn db(e: rusqlite::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

const META_CURRENT_INPUT: &str = "current_input";

/// The single mutable resource of the engine.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens a fresh in-memory database with the full schema applied.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db)?;
        let store = Self { conn };
        store.configure()?;
        schema::initialize(&store.conn)?;
        Ok(store)
    }

    /// Opens (and if necessary creates) an on-disk database. Used by tests
    /// that exercise snapshot transfer; production runs in memory.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(db)?;
        let store = Self { conn };
        store.configure()?;
        schema::initialize(&store.conn)?;
        Ok(store)
    }

    pub(crate) fn configure(&self) -> Result<()> {
        // Cascading deletes are a storage-level truth, not handler code.
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(db)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// The input index of the most recent advance request, carried in the
    /// database so snapshots transfer logical time with the data.
    pub fn current_input(&self) -> Result<InputIndex> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM engine_meta WHERE key = ?1",
                [META_CURRENT_INPUT],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db(other)),
            })?;
        match value {
            None => Ok(0),
            Some(v) => v
                .parse()
                .map_err(|_| StorageError::Corrupt(format!("current_input: {v:?}"))),
        }
    }

    pub fn set_current_input(&self, input_index: InputIndex) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO engine_meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![META_CURRENT_INPUT, input_index.to_string()],
            )
            .map(|_| ())
            .map_err(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_input_defaults_to_zero_and_persists() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.current_input().unwrap(), 0);
        store.set_current_input(41).unwrap();
        store.set_current_input(42).unwrap();
        assert_eq!(store.current_input().unwrap(), 42);
    }
}
