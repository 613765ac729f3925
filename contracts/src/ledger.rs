//! # Ledger
//!
//! Runs [`IdentityRegistry`] calls against a [`RegistryStore`].
//!
//! Calls are serialized: a mutating call holds the write lock from
//! validation through commit and event broadcast, so concurrent issuances
//! to one subject always receive distinct consecutive indices and
//! subscribers see events in sequence order. Reads take the read lock and
//! never observe a half-applied call.
//!
//! If the store rejects a commit, the in-memory registry is rolled back to
//! its state before the call, without reading the store.

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;

use credreg_protocol::config::{DEFAULT_EVENT_PAGE_SIZE, EVENT_CHANNEL_CAPACITY};
use credreg_protocol::credential::{CredentialRecord, Verification};
use credreg_protocol::events::{EventFilter, EventRecord, RegistryStats};
use credreg_protocol::identity::{AccountId, RequestContext, Role};
use credreg_protocol::storage::{DbError, RegistryStore};

use crate::identity_registry::{IdentityRegistry, NewCredential, RegistryError};

/// Errors from a ledger call.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The registry rejected the call.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The store failed. The call had no effect.
    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

/// Persistent, thread-safe front end to the registry.
pub struct Ledger<S: RegistryStore> {
    registry: RwLock<IdentityRegistry>,
    store: S,
    events_tx: broadcast::Sender<EventRecord>,
}

impl<S: RegistryStore> Ledger<S> {
    /// Deploys a new registry into an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::AlreadyDeployed`] if the store already holds one.
    pub fn deploy(store: S, ctx: &RequestContext) -> Result<Self, LedgerError> {
        if store.load()?.is_some() {
            return Err(DbError::AlreadyDeployed.into());
        }
        let mut registry = IdentityRegistry::deploy(ctx);
        store.commit(&registry.take_journal())?;
        tracing::info!(admin = %ctx.caller, "registry deployed");
        Ok(Self::with_registry(registry, store))
    }

    /// Opens a previously deployed registry.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotDeployed`] if the store is empty.
    pub fn open(store: S) -> Result<Self, LedgerError> {
        let snapshot = store.load()?.ok_or(DbError::NotDeployed)?;
        tracing::info!(
            admin = %snapshot.admin,
            subjects = snapshot.credentials.len(),
            "registry loaded"
        );
        Ok(Self::with_registry(
            IdentityRegistry::from_snapshot(snapshot),
            store,
        ))
    }

    /// Opens the registry in `store`, deploying one with `ctx.caller` as
    /// admin if the store is empty.
    pub fn open_or_deploy(store: S, ctx: &RequestContext) -> Result<Self, LedgerError> {
        if store.load()?.is_some() {
            Self::open(store)
        } else {
            Self::deploy(store, ctx)
        }
    }

    fn with_registry(registry: IdentityRegistry, store: S) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry: RwLock::new(registry),
            store,
            events_tx,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Receives every event committed after this call, in sequence order.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events_tx.subscribe()
    }

    // -- Execution ------------------------------------------------------------

    /// Runs one mutating call: validate and apply in memory, commit the
    /// journal, then broadcast the sequenced events. A failed commit restores
    /// the registry as it was before the call.
    fn transact<T>(
        &self,
        op: &'static str,
        call: impl FnOnce(&mut IdentityRegistry) -> Result<T, RegistryError>,
    ) -> Result<T, LedgerError> {
        let mut registry = self.registry.write();
        let before = registry.clone();

        let value = match call(&mut registry) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(op, kind = err.kind(), error = %err, "call rejected");
                return Err(err.into());
            }
        };

        let commit = registry.take_journal();
        if commit.is_empty() {
            tracing::trace!(op, "call wrote nothing");
            return Ok(value);
        }

        match self.store.commit(&commit) {
            Ok(records) => {
                tracing::debug!(op, events = records.len(), "call committed");
                for record in records {
                    // No subscribers is fine.
                    let _ = self.events_tx.send(record);
                }
                Ok(value)
            }
            Err(err) => {
                tracing::error!(op, error = %err, "commit failed, rolling back call");
                *registry = before;
                Err(err.into())
            }
        }
    }

    // -- Mutations ------------------------------------------------------------

    /// See [`IdentityRegistry::assign_role`].
    pub fn assign_role(
        &self,
        ctx: &RequestContext,
        target: AccountId,
        role: Role,
    ) -> Result<(), LedgerError> {
        self.transact("assign_role", |r| r.assign_role(ctx, target, role))
    }

    /// See [`IdentityRegistry::issue_credential`].
    pub fn issue_credential(
        &self,
        ctx: &RequestContext,
        subject: AccountId,
        credential: NewCredential,
    ) -> Result<u64, LedgerError> {
        self.transact("issue_credential", |r| {
            r.issue_credential(ctx, subject, credential)
        })
    }

    /// See [`IdentityRegistry::revoke_credential`].
    pub fn revoke_credential(
        &self,
        ctx: &RequestContext,
        subject: AccountId,
        index: u64,
    ) -> Result<(), LedgerError> {
        self.transact("revoke_credential", |r| {
            r.revoke_credential(ctx, subject, index)
        })
    }

    /// See [`IdentityRegistry::allow_verifier`].
    pub fn allow_verifier(
        &self,
        ctx: &RequestContext,
        subject: AccountId,
        index: u64,
        verifier: AccountId,
    ) -> Result<(), LedgerError> {
        self.transact("allow_verifier", |r| {
            r.allow_verifier(ctx, subject, index, verifier)
        })
    }

    // -- Queries --------------------------------------------------------------

    /// See [`IdentityRegistry::admin`].
    pub fn admin(&self) -> AccountId {
        self.registry.read().admin()
    }

    /// See [`IdentityRegistry::role_of`].
    pub fn role_of(&self, account: &AccountId) -> Role {
        self.registry.read().role_of(account)
    }

    /// See [`IdentityRegistry::credential_count`].
    pub fn credential_count(&self, subject: &AccountId) -> u64 {
        self.registry.read().credential_count(subject)
    }

    /// See [`IdentityRegistry::get_credential`].
    pub fn get_credential(
        &self,
        ctx: &RequestContext,
        subject: &AccountId,
        index: u64,
    ) -> Result<CredentialRecord, RegistryError> {
        self.registry.read().get_credential(ctx, subject, index)
    }

    /// See [`IdentityRegistry::get_public_credentials`].
    pub fn get_public_credentials(&self, subject: &AccountId) -> Vec<CredentialRecord> {
        self.registry.read().get_public_credentials(subject)
    }

    /// See [`IdentityRegistry::get_all_credentials`].
    pub fn get_all_credentials(
        &self,
        ctx: &RequestContext,
        subject: &AccountId,
    ) -> Result<Vec<CredentialRecord>, RegistryError> {
        self.registry.read().get_all_credentials(ctx, subject)
    }

    /// See [`IdentityRegistry::verify_credential`].
    pub fn verify_credential(
        &self,
        ctx: &RequestContext,
        subject: &AccountId,
        index: u64,
    ) -> Result<Verification, RegistryError> {
        self.registry.read().verify_credential(ctx, subject, index)
    }

    /// See [`IdentityRegistry::verify_batch`].
    pub fn verify_batch(
        &self,
        ctx: &RequestContext,
        requests: &[(AccountId, u64)],
    ) -> Vec<Result<Verification, RegistryError>> {
        self.registry.read().verify_batch(ctx, requests)
    }

    /// Committed events matching `filter`. Without an explicit limit at most
    /// [`DEFAULT_EVENT_PAGE_SIZE`] records are returned.
    pub fn events(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, LedgerError> {
        let mut filter = filter.clone();
        filter.limit.get_or_insert(DEFAULT_EVENT_PAGE_SIZE);
        Ok(self.store.events(&filter)?)
    }

    /// Sequence number of the newest committed event.
    pub fn latest_sequence(&self) -> Result<Option<u64>, LedgerError> {
        Ok(self.store.latest_sequence()?)
    }

    /// Replays the whole event log into aggregate counters.
    pub fn stats(&self) -> Result<RegistryStats, LedgerError> {
        let events = self.store.events(&EventFilter::all())?;
        Ok(RegistryStats::from_events(&events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credreg_protocol::events::{EventKind, RegistryEvent};
    use credreg_protocol::storage::MemoryStore;
    use std::sync::Arc;

    fn acct(b: u8) -> AccountId {
        AccountId::from_bytes([b; 20])
    }

    fn ctx(caller: AccountId) -> RequestContext {
        RequestContext::new(caller, 1_700_000_000)
    }

    fn degree() -> NewCredential {
        NewCredential {
            title: "Degree".into(),
            issuer_name: "University".into(),
            document_hash: "QmHash".into(),
            is_public: true,
            expires_at: 0,
        }
    }

    fn ledger() -> Ledger<Arc<MemoryStore>> {
        let ledger = Ledger::deploy(Arc::new(MemoryStore::new()), &ctx(acct(1))).unwrap();
        ledger.assign_role(&ctx(acct(1)), acct(2), Role::Issuer).unwrap();
        ledger
    }

    #[test]
    fn deploy_twice_fails() {
        let store = Arc::new(MemoryStore::new());
        Ledger::deploy(store.clone(), &ctx(acct(1))).unwrap();
        let err = Ledger::deploy(store, &ctx(acct(1))).err().unwrap();
        assert!(matches!(err, LedgerError::Storage(DbError::AlreadyDeployed)));
    }

    #[test]
    fn open_empty_store_fails() {
        let err = Ledger::open(MemoryStore::new()).err().unwrap();
        assert!(matches!(err, LedgerError::Storage(DbError::NotDeployed)));
    }

    #[test]
    fn reopen_sees_committed_state() {
        let store = Arc::new(MemoryStore::new());
        let first = Ledger::deploy(store.clone(), &ctx(acct(1))).unwrap();
        first.assign_role(&ctx(acct(1)), acct(2), Role::Issuer).unwrap();
        first.issue_credential(&ctx(acct(2)), acct(3), degree()).unwrap();

        let second = Ledger::open(store).unwrap();
        assert_eq!(second.admin(), acct(1));
        assert_eq!(second.role_of(&acct(2)), Role::Issuer);
        assert_eq!(second.credential_count(&acct(3)), 1);
    }

    #[test]
    fn open_or_deploy_keeps_existing_admin() {
        let store = Arc::new(MemoryStore::new());
        Ledger::open_or_deploy(store.clone(), &ctx(acct(1))).unwrap();
        let again = Ledger::open_or_deploy(store, &ctx(acct(9))).unwrap();
        assert_eq!(again.admin(), acct(1));
    }

    #[test]
    fn rejected_call_commits_nothing() {
        let ledger = ledger();
        let before = ledger.latest_sequence().unwrap();
        let err = ledger
            .issue_credential(&ctx(acct(3)), acct(3), degree())
            .unwrap_err();
        assert!(matches!(err, LedgerError::Registry(RegistryError::Unauthorized(_))));
        assert_eq!(ledger.latest_sequence().unwrap(), before);
    }

    #[test]
    fn events_are_sequenced_and_broadcast() {
        let ledger = ledger();
        let mut rx = ledger.subscribe();

        ledger.issue_credential(&ctx(acct(2)), acct(3), degree()).unwrap();
        ledger.revoke_credential(&ctx(acct(2)), acct(3), 0).unwrap();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(first.event.kind(), EventKind::CredentialIssued);
        assert_eq!(second.sequence, 2);
        assert_eq!(
            second.event,
            RegistryEvent::CredentialRevoked { subject: acct(3), index: 0 }
        );
        assert_eq!(ledger.latest_sequence().unwrap(), Some(2));
    }

    #[test]
    fn noop_revoke_emits_nothing() {
        let ledger = ledger();
        ledger.issue_credential(&ctx(acct(2)), acct(3), degree()).unwrap();
        ledger.revoke_credential(&ctx(acct(2)), acct(3), 0).unwrap();
        let mut rx = ledger.subscribe();
        ledger.revoke_credential(&ctx(acct(2)), acct(3), 0).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stats_replay_log() {
        let ledger = ledger();
        ledger.issue_credential(&ctx(acct(2)), acct(3), degree()).unwrap();
        ledger.issue_credential(&ctx(acct(2)), acct(3), degree()).unwrap();
        ledger.revoke_credential(&ctx(acct(2)), acct(3), 1).unwrap();

        let stats = ledger.stats().unwrap();
        assert_eq!(stats.credentials_issued, 2);
        assert_eq!(stats.credentials_revoked, 1);
        assert_eq!(stats.credentials_active, 1);
        assert_eq!(stats.accounts_by_role.get(&Role::Issuer), Some(&1));
    }

    #[test]
    fn event_query_filters() {
        let ledger = ledger();
        ledger.issue_credential(&ctx(acct(2)), acct(3), degree()).unwrap();
        ledger.issue_credential(&ctx(acct(2)), acct(4), degree()).unwrap();

        let issued = ledger
            .events(&EventFilter::all().kind(EventKind::CredentialIssued))
            .unwrap();
        assert_eq!(issued.len(), 2);

        let for_four = ledger.events(&EventFilter::all().account(acct(4))).unwrap();
        assert_eq!(for_four.len(), 1);
        assert_eq!(for_four[0].sequence, 2);

        let limited = ledger.events(&EventFilter::all().limit(1)).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].sequence, 0);
    }
}
