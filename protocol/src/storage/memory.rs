//! In-memory [`RegistryStore`].
//!
//! Keeps the snapshot and event log behind a single lock. A commit is
//! applied to a copy of the snapshot and swapped in only when every change
//! applied cleanly, so a rejected commit leaves nothing behind.

use parking_lot::RwLock;

use super::{Commit, DbError, DbResult, RegistrySnapshot, RegistryStore, StateChange};
use crate::events::{EventFilter, EventRecord};

#[derive(Debug, Default)]
struct Inner {
    snapshot: Option<RegistrySnapshot>,
    events: Vec<EventRecord>,
}

/// Volatile registry store. Everything is lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Creates an empty store with no registry deployed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events in the log.
    pub fn event_count(&self) -> usize {
        self.inner.read().events.len()
    }
}

impl RegistryStore for MemoryStore {
    fn load(&self) -> DbResult<Option<RegistrySnapshot>> {
        Ok(self.inner.read().snapshot.clone())
    }

    fn commit(&self, commit: &Commit) -> DbResult<Vec<EventRecord>> {
        let mut inner = self.inner.write();

        let mut changes = commit.changes.iter().peekable();
        let mut next = match (&inner.snapshot, changes.peek()) {
            (None, Some(StateChange::Deployed { admin })) => {
                changes.next();
                RegistrySnapshot::new(*admin)
            }
            (None, _) => return Err(DbError::NotDeployed),
            (Some(current), _) => current.clone(),
        };

        for change in changes {
            next.apply(change)?;
        }

        let records = commit.sequence_events(inner.events.len() as u64);
        inner.snapshot = Some(next);
        inner.events.extend(records.iter().cloned());
        Ok(records)
    }

    fn events(&self, filter: &EventFilter) -> DbResult<Vec<EventRecord>> {
        let inner = self.inner.read();
        let matching = inner.events.iter().filter(|r| filter.matches(r)).cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    fn latest_sequence(&self) -> DbResult<Option<u64>> {
        Ok(self.inner.read().events.len().checked_sub(1).map(|n| n as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RegistryEvent;
    use crate::identity::{AccountId, Role};

    fn acct(b: u8) -> AccountId {
        AccountId::from_bytes([b; 20])
    }

    fn deploy(store: &MemoryStore, admin: AccountId) {
        store
            .commit(&Commit {
                changes: vec![StateChange::Deployed { admin }],
                events: vec![],
                committed_at: 1,
            })
            .unwrap();
    }

    #[test]
    fn empty_store_has_no_registry() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
        assert_eq!(store.latest_sequence().unwrap(), None);
    }

    #[test]
    fn commit_before_deploy_rejected() {
        let store = MemoryStore::new();
        let err = store
            .commit(&Commit {
                changes: vec![StateChange::RoleSet { account: acct(1), role: Role::Issuer }],
                events: vec![],
                committed_at: 1,
            })
            .unwrap_err();
        assert!(matches!(err, DbError::NotDeployed));
    }

    #[test]
    fn second_deploy_rejected() {
        let store = MemoryStore::new();
        deploy(&store, acct(1));
        let err = store
            .commit(&Commit {
                changes: vec![StateChange::Deployed { admin: acct(2) }],
                events: vec![],
                committed_at: 2,
            })
            .unwrap_err();
        assert!(matches!(err, DbError::AlreadyDeployed));
        assert_eq!(store.load().unwrap().unwrap().admin, acct(1));
    }

    #[test]
    fn events_are_sequenced_across_commits() {
        let store = MemoryStore::new();
        deploy(&store, acct(1));
        for i in 0..3u8 {
            let records = store
                .commit(&Commit {
                    changes: vec![StateChange::RoleSet { account: acct(10 + i), role: Role::User }],
                    events: vec![RegistryEvent::RoleAssigned { target: acct(10 + i), role: Role::User }],
                    committed_at: 100,
                })
                .unwrap();
            assert_eq!(records[0].sequence, i as u64);
        }
        assert_eq!(store.latest_sequence().unwrap(), Some(2));
        assert_eq!(store.events(&EventFilter::all().limit(2)).unwrap().len(), 2);
    }
}
