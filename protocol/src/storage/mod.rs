//! # Storage Module
//!
//! Persistence for the credential registry. The registry state machine runs
//! in memory; every committed call is written through a [`RegistryStore`]
//! so the state survives restarts and the event log can be queried.
//!
//! ## Architecture
//!
//! ```text
//! memory.rs — MemoryStore: in-process store for tests and throwaway nodes
//! db.rs     — RegistryDB: sled-backed store with one tree per concern
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! call → IdentityRegistry (validate + mutate) → Commit { changes, events }
//!                                                   ↓
//!                                            RegistryStore::commit
//!                                      (atomic: all changes + events, or none)
//! ```
//!
//! A [`Commit`] is the complete effect of one call. Stores must apply it
//! atomically and assign event sequence numbers in commit order, with no
//! gaps. A failed commit leaves the store exactly as it was.

pub mod db;
pub mod memory;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::credential::CredentialRecord;
use crate::events::{EventFilter, EventRecord, RegistryEvent};
use crate::identity::{AccountId, Role};

pub use db::RegistryDB;
pub use memory::MemoryStore;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("registry already deployed in this store")]
    AlreadyDeployed,

    #[error("registry not deployed in this store")]
    NotDeployed,

    #[error("inconsistent store: {0}")]
    Inconsistent(String),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Commit Journal
// ---------------------------------------------------------------------------

/// A single write produced by a registry call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateChange {
    /// The registry was created with this admin.
    Deployed { admin: AccountId },
    /// An account's role was set.
    RoleSet { account: AccountId, role: Role },
    /// A credential record was created or updated in place.
    CredentialWritten {
        subject: AccountId,
        index: u64,
        record: CredentialRecord,
    },
}

/// Everything one successful call wrote, to be persisted as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Commit {
    /// State writes, in the order they were made.
    pub changes: Vec<StateChange>,
    /// Events to append to the log, in emission order.
    pub events: Vec<RegistryEvent>,
    /// Transaction time, unix seconds.
    pub committed_at: u64,
}

impl Commit {
    /// Whether the call wrote nothing at all.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.events.is_empty()
    }

    /// Stamps events with sequence numbers starting at `first_sequence`.
    pub fn sequence_events(&self, first_sequence: u64) -> Vec<EventRecord> {
        self.events
            .iter()
            .enumerate()
            .map(|(offset, event)| EventRecord {
                sequence: first_sequence + offset as u64,
                committed_at: self.committed_at,
                event: event.clone(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The full persisted registry state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// The deploying account.
    pub admin: AccountId,
    /// Explicitly assigned roles.
    pub roles: HashMap<AccountId, Role>,
    /// Per-subject credential sequences, index order.
    pub credentials: HashMap<AccountId, Vec<CredentialRecord>>,
}

impl RegistrySnapshot {
    /// A freshly deployed registry.
    pub fn new(admin: AccountId) -> Self {
        Self {
            admin,
            roles: HashMap::new(),
            credentials: HashMap::new(),
        }
    }

    /// Applies one change, rejecting writes that would leave a gap in a
    /// credential sequence.
    pub fn apply(&mut self, change: &StateChange) -> DbResult<()> {
        match change {
            StateChange::Deployed { .. } => return Err(DbError::AlreadyDeployed),
            StateChange::RoleSet { account, role } => {
                self.roles.insert(*account, *role);
            }
            StateChange::CredentialWritten {
                subject,
                index,
                record,
            } => {
                let sequence = self.credentials.entry(*subject).or_default();
                let index = *index as usize;
                if index < sequence.len() {
                    sequence[index] = record.clone();
                } else if index == sequence.len() {
                    sequence.push(record.clone());
                } else {
                    return Err(DbError::Inconsistent(format!(
                        "credential {} for {} written past end ({})",
                        index,
                        subject,
                        sequence.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Store Trait
// ---------------------------------------------------------------------------

/// Transactional backing store for the registry.
///
/// Implementations are shared across threads behind `Arc`, so every method
/// takes `&self`. Writers are serialized by the caller; implementations only
/// need to make each [`commit`](Self::commit) atomic.
pub trait RegistryStore: Send + Sync {
    /// Reads the full state, or `None` if no registry was deployed here.
    fn load(&self) -> DbResult<Option<RegistrySnapshot>>;

    /// Persists one call's writes and events atomically. Returns the events
    /// with their assigned sequence numbers.
    fn commit(&self, commit: &Commit) -> DbResult<Vec<EventRecord>>;

    /// Reads committed events matching `filter`, in sequence order.
    fn events(&self, filter: &EventFilter) -> DbResult<Vec<EventRecord>>;

    /// Sequence number of the newest event, or `None` if the log is empty.
    fn latest_sequence(&self) -> DbResult<Option<u64>>;
}

impl<S: RegistryStore + ?Sized> RegistryStore for std::sync::Arc<S> {
    fn load(&self) -> DbResult<Option<RegistrySnapshot>> {
        (**self).load()
    }

    fn commit(&self, commit: &Commit) -> DbResult<Vec<EventRecord>> {
        (**self).commit(commit)
    }

    fn events(&self, filter: &EventFilter) -> DbResult<Vec<EventRecord>> {
        (**self).events(filter)
    }

    fn latest_sequence(&self) -> DbResult<Option<u64>> {
        (**self).latest_sequence()
    }
}
