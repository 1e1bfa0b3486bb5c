//! Persistence boundary for cross-run risk state.
//!
//! [`PropertyRiskState`] is the only entity that outlives a run. A
//! [`StateStore`] hands the orchestrator a snapshot before scoring and
//! accepts the updated states in one all-or-nothing [`StateStore::commit`]
//! once the run has succeeded.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::{PropertyId, PropertyRiskState};

#[cfg(feature = "store-sqlite")]
mod sqlite;

#[cfg(feature = "store-sqlite")]
pub use sqlite::SqliteStateStore;

/// Prior states keyed by property.
pub type StateSnapshot = BTreeMap<PropertyId, PropertyRiskState>;

/// Error raised when risk state cannot be loaded or committed.
///
/// Store failures abort the run: nothing is committed.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening the backing database failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to open state database at {path}")]
    Open {
        /// Location of the database.
        path: std::path::PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Creating the state tables failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to create state tables")]
    CreateSchema {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Reading persisted state failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to read persisted state")]
    Read {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Writing one property's state failed; the transaction was rolled back.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to persist state for {property_id}")]
    PersistRow {
        /// Property being written.
        property_id: PropertyId,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Beginning or committing the transaction failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to commit state transaction")]
    Commit {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A persisted row holds a value the domain types reject.
    #[error("corrupt state for {property_id}: {message}")]
    Corrupt {
        /// Property whose row is invalid.
        property_id: PropertyId,
        /// What was wrong.
        message: String,
    },
    /// The backend refused the operation.
    #[error("state store unavailable: {message}")]
    Unavailable {
        /// Backend-specific description.
        message: String,
    },
}

/// Load and atomically replace persisted risk state.
pub trait StateStore {
    /// Load every persisted state.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backend cannot be read or holds
    /// invalid rows.
    fn load_all(&self) -> Result<StateSnapshot, StoreError>;

    /// Upsert `states` as a single batch.
    ///
    /// Either every state is written or none is. States for properties not
    /// listed are left untouched.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the batch cannot be written; the store
    /// keeps its previous contents.
    fn commit(&mut self, states: &[PropertyRiskState]) -> Result<(), StoreError>;
}

/// In-process [`StateStore`] backed by a map.
///
/// # Examples
/// ```
/// use nuisance_core::{MemoryStateStore, StateStore};
///
/// let store = MemoryStateStore::default();
/// assert!(store.load_all().unwrap().is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    states: StateSnapshot,
    commits: usize,
}

impl MemoryStateStore {
    /// Seed a store with existing states.
    #[must_use]
    pub fn with_states(states: impl IntoIterator<Item = PropertyRiskState>) -> Self {
        Self {
            states: states
                .into_iter()
                .map(|state| (state.property_id.clone(), state))
                .collect(),
            commits: 0,
        }
    }

    /// Number of successful commits.
    #[must_use]
    pub const fn commit_count(&self) -> usize {
        self.commits
    }

    /// Borrow the persisted state for one property.
    #[must_use]
    pub fn get(&self, property_id: &PropertyId) -> Option<&PropertyRiskState> {
        self.states.get(property_id)
    }
}

impl StateStore for MemoryStateStore {
    fn load_all(&self) -> Result<StateSnapshot, StoreError> {
        Ok(self.states.clone())
    }

    fn commit(&mut self, states: &[PropertyRiskState]) -> Result<(), StoreError> {
        let mut next = self.states.clone();
        next.extend(
            states
                .iter()
                .map(|state| (state.property_id.clone(), state.clone())),
        );
        self.states = next;
        self.commits += 1;
        Ok(())
    }
}
