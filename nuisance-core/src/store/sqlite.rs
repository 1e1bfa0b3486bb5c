//! SQLite-backed [`StateStore`].
//!
//! Two tables hold the state:
//!
//! - `property_risk_state(property_id PRIMARY KEY, last_category,
//!   last_probability, last_epoch)`
//! - `category_history(property_id, seq, epoch, category)`, keyed by
//!   `(property_id, seq)`.
//!
//! [`SqliteStateStore::commit`] writes a whole batch inside one transaction,
//! replacing each property's history.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use log::debug;
use rusqlite::{Connection, Transaction, params};

use super::{StateSnapshot, StateStore, StoreError};
use crate::{Epoch, HistoryEntry, Probability, PropertyId, PropertyRiskState};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS property_risk_state (
    property_id TEXT PRIMARY KEY NOT NULL,
    last_category TEXT NOT NULL,
    last_probability REAL NOT NULL,
    last_epoch TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS category_history (
    property_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    epoch TEXT NOT NULL,
    category TEXT NOT NULL,
    PRIMARY KEY (property_id, seq)
);
";

/// Persistent risk state in a SQLite database.
pub struct SqliteStateStore {
    connection: Connection,
}

impl fmt::Debug for SqliteStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStateStore")
            .field("path", &self.connection.path())
            .finish_non_exhaustive()
    }
}

impl SqliteStateStore {
    /// Open (or create) the database at `path` and ensure the tables exist.
    ///
    /// # Errors
    /// Returns [`StoreError::Open`] when the database cannot be opened and
    /// [`StoreError::CreateSchema`] when the tables cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref();
        let connection = Connection::open(db_path).map_err(|source| StoreError::Open {
            path: db_path.to_path_buf(),
            source,
        })?;
        Self::with_connection(connection)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns [`StoreError`] when SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: ":memory:".into(),
            source,
        })?;
        Self::with_connection(connection)
    }

    fn with_connection(connection: Connection) -> Result<Self, StoreError> {
        connection
            .execute_batch(SCHEMA)
            .map_err(|source| StoreError::CreateSchema { source })?;
        Ok(Self { connection })
    }

    fn load_history(&self) -> Result<BTreeMap<PropertyId, Vec<HistoryEntry>>, StoreError> {
        let mut statement = self
            .connection
            .prepare(
                "SELECT property_id, epoch, category FROM category_history \
                 ORDER BY property_id, seq",
            )
            .map_err(|source| StoreError::Read { source })?;
        let rows = statement
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|source| StoreError::Read { source })?;

        let mut history: BTreeMap<PropertyId, Vec<HistoryEntry>> = BTreeMap::new();
        for row in rows {
            let (property_id, epoch, category) = row.map_err(|source| StoreError::Read { source })?;
            history
                .entry(PropertyId::new(property_id))
                .or_default()
                .push(HistoryEntry {
                    epoch: Epoch::new(epoch),
                    category,
                });
        }
        Ok(history)
    }
}

impl StateStore for SqliteStateStore {
    fn load_all(&self) -> Result<StateSnapshot, StoreError> {
        let mut history = self.load_history()?;
        let mut statement = self
            .connection
            .prepare(
                "SELECT property_id, last_category, last_probability, last_epoch \
                 FROM property_risk_state ORDER BY property_id",
            )
            .map_err(|source| StoreError::Read { source })?;
        let rows = statement
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|source| StoreError::Read { source })?;

        let mut snapshot = StateSnapshot::new();
        for row in rows {
            let (id, last_category, probability, last_epoch) =
                row.map_err(|source| StoreError::Read { source })?;
            let property_id = PropertyId::new(id);
            let last_probability =
                Probability::new(probability).ok_or_else(|| StoreError::Corrupt {
                    property_id: property_id.clone(),
                    message: format!("last_probability {probability} is outside [0, 1]"),
                })?;
            let category_history = history.remove(&property_id).unwrap_or_default();
            snapshot.insert(
                property_id.clone(),
                PropertyRiskState {
                    property_id,
                    last_category,
                    last_probability,
                    last_epoch: Epoch::new(last_epoch),
                    category_history,
                },
            );
        }
        debug!("Loaded risk state: properties={}", snapshot.len());
        Ok(snapshot)
    }

    fn commit(&mut self, states: &[PropertyRiskState]) -> Result<(), StoreError> {
        let transaction = self
            .connection
            .transaction()
            .map_err(|source| StoreError::Commit { source })?;
        for state in states {
            persist_state(&transaction, state).map_err(|source| StoreError::PersistRow {
                property_id: state.property_id.clone(),
                source,
            })?;
        }
        transaction
            .commit()
            .map_err(|source| StoreError::Commit { source })?;
        debug!("Committed risk state: properties={}", states.len());
        Ok(())
    }
}

fn persist_state(
    transaction: &Transaction<'_>,
    state: &PropertyRiskState,
) -> Result<(), rusqlite::Error> {
    let id = state.property_id.as_str();
    transaction.execute(
        "INSERT INTO property_risk_state \
             (property_id, last_category, last_probability, last_epoch) \
         VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(property_id) DO UPDATE SET \
             last_category = excluded.last_category, \
             last_probability = excluded.last_probability, \
             last_epoch = excluded.last_epoch",
        params![
            id,
            state.last_category,
            state.last_probability.get(),
            state.last_epoch.as_str()
        ],
    )?;
    transaction.execute(
        "DELETE FROM category_history WHERE property_id = ?1",
        params![id],
    )?;
    let mut insert = transaction.prepare_cached(
        "INSERT INTO category_history (property_id, seq, epoch, category) \
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (seq, entry) in (0_i64..).zip(&state.category_history) {
        insert.execute(params![id, seq, entry.epoch.as_str(), entry.category])?;
    }
    Ok(())
}
