//! # RegistryDB — Persistent Storage Engine
//!
//! The persistence layer for the credential registry, built on sled's
//! embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree          | Key                                  | Value                    |
//! |---------------|--------------------------------------|--------------------------|
//! | `meta`        | key (UTF-8)                          | value (bytes)            |
//! | `roles`       | `account` (20B)                      | `bincode(Role)`          |
//! | `credentials` | `subject` (20B) ‖ `index` (8B BE)    | `bincode(CredentialRecord)` |
//! | `events`      | `sequence` (8B BE)                   | `json(EventRecord)`      |
//!
//! Credential indices and event sequences are stored big-endian so that
//! sled's lexicographic ordering matches numeric ordering: a prefix scan on
//! a subject yields its credentials in index order, and a range scan over
//! `events` yields the log in commit order.
//!
//! Events are stored as JSON rather than bincode because the event enum is
//! internally tagged, which bincode cannot decode.
//!
//! ## Atomicity
//!
//! A [`Commit`] is written in one multi-tree sled transaction covering all
//! four trees. Either every state change and every event lands, or none do.

use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Db, Transactional, Tree};
use std::collections::HashMap;
use std::path::Path;

use super::{Commit, DbError, DbResult, RegistrySnapshot, RegistryStore, StateChange};
use crate::credential::CredentialRecord;
use crate::events::{EventFilter, EventRecord};
use crate::identity::{AccountId, Role, ACCOUNT_ID_LENGTH};

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Well-known key in the `meta` tree for the deploying admin.
const META_ADMIN: &[u8] = b"admin";

/// Well-known key in the `meta` tree for the next event sequence number.
const META_NEXT_SEQUENCE: &[u8] = b"next_event_sequence";

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

fn encode<T: serde::Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode_u64(bytes: &[u8]) -> DbResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| DbError::Serialization("invalid u64 bytes".to_string()))?;
    Ok(u64::from_be_bytes(arr))
}

fn decode_account(bytes: &[u8]) -> DbResult<AccountId> {
    let arr: [u8; ACCOUNT_ID_LENGTH] = bytes
        .try_into()
        .map_err(|_| DbError::Serialization("invalid account bytes".to_string()))?;
    Ok(AccountId::from_bytes(arr))
}

/// `subject || index (BE)`.
fn credential_key(subject: &AccountId, index: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(ACCOUNT_ID_LENGTH + 8);
    key.extend_from_slice(subject.as_bytes());
    key.extend_from_slice(&index.to_be_bytes());
    key
}

fn abort(err: DbError) -> ConflictableTransactionError<DbError> {
    ConflictableTransactionError::Abort(err)
}

// ---------------------------------------------------------------------------
// RegistryDB
// ---------------------------------------------------------------------------

/// Persistent storage engine for the credential registry.
///
/// Wraps a sled `Db` instance and exposes the [`RegistryStore`] interface
/// over four named trees.
///
/// # Thread Safety
///
/// sled is thread-safe, so `RegistryDB` can be shared across threads via
/// `Arc<RegistryDB>` without external synchronization.
#[derive(Debug, Clone)]
pub struct RegistryDB {
    /// The underlying sled database handle.
    db: Db,
    /// Admin and sequence counters.
    meta: Tree,
    /// Explicitly assigned roles, keyed by account bytes.
    roles: Tree,
    /// Credential records keyed by subject and index.
    credentials: Tree,
    /// Event log keyed by sequence number.
    events: Tree,
}

impl RegistryDB {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    ///
    /// Used by unit tests; nothing is left on disk.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let meta = db.open_tree("meta")?;
        let roles = db.open_tree("roles")?;
        let credentials = db.open_tree("credentials")?;
        let events = db.open_tree("events")?;

        Ok(Self {
            db,
            meta,
            roles,
            credentials,
            events,
        })
    }

    /// Whether a registry has been deployed into this database.
    pub fn is_deployed(&self) -> DbResult<bool> {
        Ok(self.meta.contains_key(META_ADMIN)?)
    }

    /// Number of stored credential records across all subjects.
    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }

    /// Number of events in the log.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Applies one state change inside a transaction.
    fn write_change(
        change: &StateChange,
        meta: &TransactionalTree,
        roles: &TransactionalTree,
        credentials: &TransactionalTree,
    ) -> Result<(), ConflictableTransactionError<DbError>> {
        match change {
            StateChange::Deployed { admin } => {
                if meta.get(META_ADMIN)?.is_some() {
                    return Err(abort(DbError::AlreadyDeployed));
                }
                meta.insert(META_ADMIN, &admin.as_bytes()[..])?;
            }
            StateChange::RoleSet { account, role } => {
                let value = encode(role).map_err(abort)?;
                roles.insert(&account.as_bytes()[..], value)?;
            }
            StateChange::CredentialWritten {
                subject,
                index,
                record,
            } => {
                // Appends must land directly after the current last record.
                if *index > 0 && credentials.get(credential_key(subject, index - 1))?.is_none() {
                    return Err(abort(DbError::Inconsistent(format!(
                        "credential {} for {} written past end",
                        index, subject
                    ))));
                }
                let value = encode(record).map_err(abort)?;
                credentials.insert(credential_key(subject, *index), value)?;
            }
        }
        Ok(())
    }
}

impl RegistryStore for RegistryDB {
    fn load(&self) -> DbResult<Option<RegistrySnapshot>> {
        let admin = match self.meta.get(META_ADMIN)? {
            Some(bytes) => decode_account(&bytes)?,
            None => return Ok(None),
        };

        let mut roles = HashMap::new();
        for entry in self.roles.iter() {
            let (key, value) = entry?;
            let role: Role = decode(&value)?;
            roles.insert(decode_account(&key)?, role);
        }

        let mut credentials: HashMap<AccountId, Vec<CredentialRecord>> = HashMap::new();
        for entry in self.credentials.iter() {
            let (key, value) = entry?;
            if key.len() != ACCOUNT_ID_LENGTH + 8 {
                return Err(DbError::Serialization("invalid credential key".to_string()));
            }
            let subject = decode_account(&key[..ACCOUNT_ID_LENGTH])?;
            let index = decode_u64(&key[ACCOUNT_ID_LENGTH..])?;
            let record: CredentialRecord = decode(&value)?;

            let sequence = credentials.entry(subject).or_default();
            if index != sequence.len() as u64 {
                return Err(DbError::Inconsistent(format!(
                    "credential sequence for {} has a gap at {}",
                    subject,
                    sequence.len()
                )));
            }
            sequence.push(record);
        }

        Ok(Some(RegistrySnapshot {
            admin,
            roles,
            credentials,
        }))
    }

    fn commit(&self, commit: &Commit) -> DbResult<Vec<EventRecord>> {
        let result = (&self.meta, &self.roles, &self.credentials, &self.events).transaction(
            |(meta, roles, credentials, events)| {
                if !matches!(commit.changes.first(), Some(StateChange::Deployed { .. }))
                    && meta.get(META_ADMIN)?.is_none()
                {
                    return Err(abort(DbError::NotDeployed));
                }
                for change in &commit.changes {
                    Self::write_change(change, meta, roles, credentials)?;
                }

                let first = match meta.get(META_NEXT_SEQUENCE)? {
                    Some(bytes) => decode_u64(&bytes).map_err(abort)?,
                    None => 0,
                };
                let records = commit.sequence_events(first);
                for record in &records {
                    let value = serde_json::to_vec(record)
                        .map_err(|e| abort(DbError::Serialization(e.to_string())))?;
                    events.insert(&record.sequence.to_be_bytes()[..], value)?;
                }
                let next = first + records.len() as u64;
                meta.insert(META_NEXT_SEQUENCE, &next.to_be_bytes()[..])?;

                Ok(records)
            },
        );

        let records = result.map_err(|e| match e {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => DbError::Sled(err),
        })?;

        self.db.flush()?;
        tracing::debug!(
            changes = commit.changes.len(),
            events = records.len(),
            "commit persisted"
        );
        Ok(records)
    }

    fn events(&self, filter: &EventFilter) -> DbResult<Vec<EventRecord>> {
        let start = filter.lower_bound().to_be_bytes();
        let end = filter.upper_bound().to_be_bytes();
        let limit = filter.limit.unwrap_or(usize::MAX);

        let mut records = Vec::new();
        for entry in self.events.range(start..=end) {
            if records.len() >= limit {
                break;
            }
            let (_key, value) = entry?;
            let record: EventRecord = serde_json::from_slice(&value)
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            if filter.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn latest_sequence(&self) -> DbResult<Option<u64>> {
        match self.meta.get(META_NEXT_SEQUENCE)? {
            Some(bytes) => Ok(decode_u64(&bytes)?.checked_sub(1)),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
