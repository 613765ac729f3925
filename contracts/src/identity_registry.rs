//! # Identity & Credential Registry Contract
//!
//! The authority over roles and credentials. One admin (the deployer)
//! assigns roles; issuers append credentials to a subject's sequence and
//! revoke them; subjects grant individual verifiers read access to their
//! private credentials.
//!
//! ## Security Model
//!
//! | Operation                | Who may call                               |
//! |--------------------------|--------------------------------------------|
//! | `assign_role`            | an admin                                   |
//! | `issue_credential`       | an account with role `issuer`              |
//! | `revoke_credential`      | an account with role `issuer` (any issuer) |
//! | `allow_verifier`         | the credential's subject                   |
//! | `get_all_credentials`    | the subject                                |
//! | `get_credential`         | subject, admin, allowed verifier, or anyone if public |
//! | `get_public_credentials` | anyone                                     |
//!
//! An account is an admin when it deployed the registry or holds the
//! `admin` role. Revocation is not tied to the issuing account:
//! any issuer may revoke any credential. `issued_by` is recorded on every
//! record so a stricter policy can be layered on later.
//!
//! ## Journal
//!
//! Every mutating call validates all of its preconditions before touching
//! state, so a rejected call changes nothing. A successful call records its
//! writes and events in an internal journal, which the executor drains with
//! [`IdentityRegistry::take_journal`] and persists as one commit.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use credreg_protocol::config::{MAX_DOCUMENT_HASH_LENGTH, MAX_ISSUER_NAME_LENGTH, MAX_TITLE_LENGTH};
use credreg_protocol::credential::{CredentialRecord, Verification, NEVER_EXPIRES};
use credreg_protocol::events::RegistryEvent;
use credreg_protocol::identity::{AccountId, AccountIdError, RequestContext, Role, UnknownRole};
use credreg_protocol::storage::{Commit, RegistrySnapshot, StateChange};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by registry operations. Every error leaves the registry
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The caller lacks the role or ownership the operation requires.
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    /// The referenced credential does not exist.
    #[error("invalid index: {subject} has {count} credentials, requested {index}")]
    InvalidIndex {
        /// The credential subject.
        subject: AccountId,
        /// The requested index.
        index: u64,
        /// Length of the subject's sequence.
        count: u64,
    },

    /// Malformed input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl RegistryError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::Unauthorized(_) => "unauthorized",
            RegistryError::InvalidIndex { .. } => "invalid_index",
            RegistryError::InvalidArgument(_) => "invalid_argument",
        }
    }
}

impl From<AccountIdError> for RegistryError {
    fn from(err: AccountIdError) -> Self {
        RegistryError::InvalidArgument(err.to_string())
    }
}

impl From<UnknownRole> for RegistryError {
    fn from(err: UnknownRole) -> Self {
        RegistryError::InvalidArgument(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Issuer-supplied content of a new credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCredential {
    /// Credential title.
    pub title: String,
    /// Issuing organisation name.
    pub issuer_name: String,
    /// Content address of the off-registry document.
    pub document_hash: String,
    /// Whether anyone may read the credential.
    pub is_public: bool,
    /// Expiry as unix seconds; `0` for none.
    #[serde(default)]
    pub expires_at: u64,
}

impl NewCredential {
    /// Rejects empty or oversized text fields and expiries that are not in
    /// the future.
    fn validate(&self, now: u64) -> Result<(), RegistryError> {
        check_text("title", &self.title, MAX_TITLE_LENGTH)?;
        check_text("issuer_name", &self.issuer_name, MAX_ISSUER_NAME_LENGTH)?;
        check_text("document_hash", &self.document_hash, MAX_DOCUMENT_HASH_LENGTH)?;
        if self.expires_at != NEVER_EXPIRES && self.expires_at <= now {
            return Err(RegistryError::InvalidArgument(format!(
                "expires_at {} is not after issuance time {}",
                self.expires_at, now
            )));
        }
        Ok(())
    }
}

fn check_text(field: &str, value: &str, max: usize) -> Result<(), RegistryError> {
    if value.trim().is_empty() {
        return Err(RegistryError::InvalidArgument(format!("{field} must not be empty")));
    }
    if value.len() > max {
        return Err(RegistryError::InvalidArgument(format!(
            "{field} is {} bytes, limit is {max}",
            value.len()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// IdentityRegistry
// ---------------------------------------------------------------------------

/// The registry state machine.
///
/// Operations are plain methods over in-memory maps; persistence and
/// serialization of concurrent callers are the executor's job (see
/// [`crate::ledger::Ledger`]).
#[derive(Debug, Clone)]
pub struct IdentityRegistry {
    /// The deploying account. Never changes.
    admin: AccountId,
    /// Explicitly assigned roles. Missing entries mean [`Role::User`].
    roles: HashMap<AccountId, Role>,
    /// Per-subject append-only credential sequences.
    credentials: HashMap<AccountId, Vec<CredentialRecord>>,
    /// Writes and events of the current call, not yet committed.
    journal: Commit,
}

impl IdentityRegistry {
    /// Deploys a new registry with the caller as admin.
    ///
    /// The admin also receives the `admin` role. The deployment itself is
    /// journaled but emits no event.
    pub fn deploy(ctx: &RequestContext) -> Self {
        let mut registry = Self {
            admin: ctx.caller,
            roles: HashMap::new(),
            credentials: HashMap::new(),
            journal: Commit::default(),
        };
        registry.roles.insert(ctx.caller, Role::Admin);
        registry.journal.committed_at = ctx.now;
        registry.journal.changes.push(StateChange::Deployed { admin: ctx.caller });
        registry.journal.changes.push(StateChange::RoleSet {
            account: ctx.caller,
            role: Role::Admin,
        });
        registry
    }

    /// Rebuilds a registry from persisted state.
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        Self {
            admin: snapshot.admin,
            roles: snapshot.roles,
            credentials: snapshot.credentials,
            journal: Commit::default(),
        }
    }

    /// Drains the writes and events recorded since the last drain.
    pub fn take_journal(&mut self) -> Commit {
        std::mem::take(&mut self.journal)
    }

    // -- Queries ------------------------------------------------------------

    /// The deploying account.
    pub fn admin(&self) -> AccountId {
        self.admin
    }

    /// The role of `account`, defaulting to [`Role::User`].
    pub fn role_of(&self, account: &AccountId) -> Role {
        self.roles.get(account).copied().unwrap_or_default()
    }

    /// Whether `account` may act as an admin.
    pub fn is_admin(&self, account: &AccountId) -> bool {
        *account == self.admin || self.role_of(account) == Role::Admin
    }

    /// Length of `subject`'s credential sequence.
    pub fn credential_count(&self, subject: &AccountId) -> u64 {
        self.credentials.get(subject).map_or(0, |s| s.len() as u64)
    }

    /// Whether `caller` may read `record`, which belongs to `subject`.
    fn can_read(&self, caller: &AccountId, subject: &AccountId, record: &CredentialRecord) -> bool {
        caller == subject || self.is_admin(caller) || record.is_public || record.is_verifier(caller)
    }

    fn record(&self, subject: &AccountId, index: u64) -> Result<&CredentialRecord, RegistryError> {
        self.credentials
            .get(subject)
            .and_then(|s| usize::try_from(index).ok().and_then(|i| s.get(i)))
            .ok_or(RegistryError::InvalidIndex {
                subject: *subject,
                index,
                count: self.credential_count(subject),
            })
    }

    /// Returns one credential if the caller may read it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidIndex`] if the credential does not
    /// exist, then [`RegistryError::Unauthorized`] if the caller is not the
    /// subject, an admin, an allowed verifier, and the record is private.
    pub fn get_credential(
        &self,
        ctx: &RequestContext,
        subject: &AccountId,
        index: u64,
    ) -> Result<CredentialRecord, RegistryError> {
        let record = self.record(subject, index)?;
        if !self.can_read(&ctx.caller, subject, record) {
            return Err(RegistryError::Unauthorized(
                "not authorized to view this credential",
            ));
        }
        Ok(record.clone())
    }

    /// Every public credential of `subject`, in issuance order.
    pub fn get_public_credentials(&self, subject: &AccountId) -> Vec<CredentialRecord> {
        self.credentials
            .get(subject)
            .map(|s| s.iter().filter(|r| r.is_public).cloned().collect())
            .unwrap_or_default()
    }

    /// Every credential of `subject`, public or not. Only the subject may
    /// call this.
    pub fn get_all_credentials(
        &self,
        ctx: &RequestContext,
        subject: &AccountId,
    ) -> Result<Vec<CredentialRecord>, RegistryError> {
        if ctx.caller != *subject {
            return Err(RegistryError::Unauthorized(
                "only the owner can view all their credentials",
            ));
        }
        Ok(self.credentials.get(subject).cloned().unwrap_or_default())
    }

    /// Checks one credential's validity at `ctx.now`. Access rules match
    /// [`get_credential`](Self::get_credential).
    pub fn verify_credential(
        &self,
        ctx: &RequestContext,
        subject: &AccountId,
        index: u64,
    ) -> Result<Verification, RegistryError> {
        let record = self.get_credential(ctx, subject, index)?;
        Ok(Verification::of(*subject, index, &record, ctx.now))
    }

    /// Verifies several credentials. Each item succeeds or fails on its own;
    /// results are in request order.
    pub fn verify_batch(
        &self,
        ctx: &RequestContext,
        requests: &[(AccountId, u64)],
    ) -> Vec<Result<Verification, RegistryError>> {
        requests
            .iter()
            .map(|(subject, index)| self.verify_credential(ctx, subject, *index))
            .collect()
    }

    // -- Mutations ----------------------------------------------------------

    /// Sets `target`'s role.
    ///
    /// Assigning the role an account already has still succeeds and still
    /// emits `RoleAssigned`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unauthorized`] if the caller is not an admin.
    pub fn assign_role(
        &mut self,
        ctx: &RequestContext,
        target: AccountId,
        role: Role,
    ) -> Result<(), RegistryError> {
        if !self.is_admin(&ctx.caller) {
            return Err(RegistryError::Unauthorized("only admin allowed"));
        }

        self.roles.insert(target, role);

        self.journal.committed_at = ctx.now;
        self.journal.changes.push(StateChange::RoleSet {
            account: target,
            role,
        });
        self.journal
            .events
            .push(RegistryEvent::RoleAssigned { target, role });
        Ok(())
    }

    /// Appends a credential to `subject`'s sequence and returns its index.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unauthorized`] if the caller is not an issuer.
    /// Returns [`RegistryError::InvalidArgument`] if a text field is empty or
    /// too long, or `expires_at` is neither `0` nor after `ctx.now`.
    pub fn issue_credential(
        &mut self,
        ctx: &RequestContext,
        subject: AccountId,
        credential: NewCredential,
    ) -> Result<u64, RegistryError> {
        if self.role_of(&ctx.caller) != Role::Issuer {
            return Err(RegistryError::Unauthorized("only issuers allowed"));
        }
        credential.validate(ctx.now)?;

        let record = CredentialRecord {
            title: credential.title,
            issuer_name: credential.issuer_name,
            document_hash: credential.document_hash,
            is_public: credential.is_public,
            issued_at: ctx.now,
            expires_at: credential.expires_at,
            is_revoked: false,
            allowed_verifiers: Vec::new(),
            issued_by: ctx.caller,
        };

        let sequence = self.credentials.entry(subject).or_default();
        let index = sequence.len() as u64;
        sequence.push(record.clone());

        self.journal.committed_at = ctx.now;
        self.journal.events.push(RegistryEvent::CredentialIssued {
            subject,
            index,
            title: record.title.clone(),
            issuer_name: record.issuer_name.clone(),
            issued_by: ctx.caller,
        });
        self.journal.changes.push(StateChange::CredentialWritten {
            subject,
            index,
            record,
        });
        Ok(index)
    }

    /// Revokes a credential. Revoking an already-revoked credential succeeds
    /// without writing anything or emitting an event.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unauthorized`] if the caller is not an issuer.
    /// Returns [`RegistryError::InvalidIndex`] if the credential does not exist.
    pub fn revoke_credential(
        &mut self,
        ctx: &RequestContext,
        subject: AccountId,
        index: u64,
    ) -> Result<(), RegistryError> {
        if self.role_of(&ctx.caller) != Role::Issuer {
            return Err(RegistryError::Unauthorized("only issuers allowed"));
        }
        if self.record(&subject, index)?.is_revoked {
            return Ok(());
        }

        let record = self.record_mut(&subject, index)?;
        record.is_revoked = true;
        let record = record.clone();

        self.journal.committed_at = ctx.now;
        self.journal.changes.push(StateChange::CredentialWritten {
            subject,
            index,
            record,
        });
        self.journal
            .events
            .push(RegistryEvent::CredentialRevoked { subject, index });
        Ok(())
    }

    /// Grants `verifier` read access to one of the caller's credentials.
    /// Granting an existing verifier again leaves the verifier set unchanged
    /// but still emits `VerifierAdded`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unauthorized`] if the caller is not `subject`.
    /// Returns [`RegistryError::InvalidIndex`] if the credential does not exist.
    pub fn allow_verifier(
        &mut self,
        ctx: &RequestContext,
        subject: AccountId,
        index: u64,
        verifier: AccountId,
    ) -> Result<(), RegistryError> {
        if ctx.caller != subject {
            return Err(RegistryError::Unauthorized(
                "only the owner can grant access",
            ));
        }

        let record = self.record_mut(&subject, index)?;
        let granted = record.grant(verifier).then(|| record.clone());

        self.journal.committed_at = ctx.now;
        if let Some(record) = granted {
            self.journal.changes.push(StateChange::CredentialWritten {
                subject,
                index,
                record,
            });
        }
        self.journal.events.push(RegistryEvent::VerifierAdded {
            subject,
            index,
            verifier,
        });
        Ok(())
    }

    fn record_mut(
        &mut self,
        subject: &AccountId,
        index: u64,
    ) -> Result<&mut CredentialRecord, RegistryError> {
        let count = self.credential_count(subject);
        self.credentials
            .get_mut(subject)
            .and_then(|s| usize::try_from(index).ok().and_then(move |i| s.get_mut(i)))
            .ok_or(RegistryError::InvalidIndex {
                subject: *subject,
                index,
                count,
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000;

    fn acct(b: u8) -> AccountId {
        AccountId::from_bytes([b; 20])
    }

    fn ctx(caller: AccountId) -> RequestContext {
        RequestContext::new(caller, T0)
    }

    fn new_credential(title: &str, is_public: bool) -> NewCredential {
        NewCredential {
            title: title.into(),
            issuer_name: "University".into(),
            document_hash: "QmHash123".into(),
            is_public,
            expires_at: 0,
        }
    }

    /// Admin 1, issuer 2, subject 3.
    fn setup() -> IdentityRegistry {
        let mut r = IdentityRegistry::deploy(&ctx(acct(1)));
        r.assign_role(&ctx(acct(1)), acct(2), Role::Issuer).unwrap();
        r.take_journal();
        r
    }

    #[test]
    fn deploy_makes_caller_admin() {
        let mut r = IdentityRegistry::deploy(&ctx(acct(1)));
        assert_eq!(r.admin(), acct(1));
        assert_eq!(r.role_of(&acct(1)), Role::Admin);
        let journal = r.take_journal();
        assert_eq!(journal.changes[0], StateChange::Deployed { admin: acct(1) });
        assert!(journal.events.is_empty());
    }

    #[test]
    fn unassigned_role_is_user() {
        let r = setup();
        assert_eq!(r.role_of(&acct(42)), Role::User);
    }

    #[test]
    fn admin_role_holder_can_assign() {
        let mut r = setup();
        r.assign_role(&ctx(acct(1)), acct(5), Role::Admin).unwrap();
        r.assign_role(&ctx(acct(5)), acct(6), Role::Verifier).unwrap();
        assert_eq!(r.role_of(&acct(6)), Role::Verifier);
    }

    #[test]
    fn non_admin_cannot_assign_and_nothing_is_journaled() {
        let mut r = setup();
        let err = r.assign_role(&ctx(acct(2)), acct(3), Role::Admin).unwrap_err();
        assert_eq!(err, RegistryError::Unauthorized("only admin allowed"));
        assert_eq!(r.role_of(&acct(3)), Role::User);
        assert!(r.take_journal().is_empty());
    }

    #[test]
    fn reassigning_same_role_still_emits() {
        let mut r = setup();
        r.assign_role(&ctx(acct(1)), acct(2), Role::Issuer).unwrap();
        let journal = r.take_journal();
        assert_eq!(journal.events.len(), 1);
        assert_eq!(r.role_of(&acct(2)), Role::Issuer);
    }

    #[test]
    fn deployer_keeps_admin_rights_after_role_change() {
        let mut r = setup();
        r.assign_role(&ctx(acct(1)), acct(1), Role::Issuer).unwrap();
        assert!(r.is_admin(&acct(1)));
        r.issue_credential(&ctx(acct(1)), acct(3), new_credential("Self", false))
            .unwrap();
        r.assign_role(&ctx(acct(1)), acct(7), Role::Verifier).unwrap();
    }

    #[test]
    fn issue_assigns_sequential_indices() {
        let mut r = setup();
        let a = r.issue_credential(&ctx(acct(2)), acct(3), new_credential("A", true)).unwrap();
        let b = r.issue_credential(&ctx(acct(2)), acct(3), new_credential("B", false)).unwrap();
        let c = r.issue_credential(&ctx(acct(2)), acct(4), new_credential("C", true)).unwrap();
        assert_eq!((a, b, c), (0, 1, 0));
        assert_eq!(r.credential_count(&acct(3)), 2);
    }

    #[test]
    fn issued_record_fields() {
        let mut r = setup();
        let idx = r
            .issue_credential(&ctx(acct(2)), acct(3), new_credential("T", true))
            .unwrap();
        let rec = r.get_credential(&ctx(acct(9)), &acct(3), idx).unwrap();
        assert_eq!(rec.issued_at, T0);
        assert_eq!(rec.issued_by, acct(2));
        assert!(!rec.is_revoked);
        assert!(rec.allowed_verifiers.is_empty());

        let journal = r.take_journal();
        assert_eq!(
            journal.events,
            vec![RegistryEvent::CredentialIssued {
                subject: acct(3),
                index: 0,
                title: "T".into(),
                issuer_name: "University".into(),
                issued_by: acct(2),
            }]
        );
        assert_eq!(journal.committed_at, T0);
    }

    #[test]
    fn non_issuer_cannot_issue() {
        let mut r = setup();
        let err = r
            .issue_credential(&ctx(acct(1)), acct(3), new_credential("Fake", true))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Unauthorized(_)));
        assert_eq!(r.credential_count(&acct(3)), 0);
    }

    #[test]
    fn past_expiry_rejected() {
        let mut r = setup();
        let mut cred = new_credential("Old", true);
        cred.expires_at = T0;
        let err = r.issue_credential(&ctx(acct(2)), acct(3), cred).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
        assert_eq!(r.credential_count(&acct(3)), 0);
    }

    #[test]
    fn blank_and_oversized_fields_rejected() {
        let mut r = setup();
        let mut blank = new_credential("  ", true);
        assert!(r.issue_credential(&ctx(acct(2)), acct(3), blank.clone()).is_err());
        blank.title = "x".repeat(MAX_TITLE_LENGTH + 1);
        assert!(r.issue_credential(&ctx(acct(2)), acct(3), blank).is_err());
        let mut no_hash = new_credential("T", true);
        no_hash.document_hash = String::new();
        assert!(r.issue_credential(&ctx(acct(2)), acct(3), no_hash).is_err());
        assert!(r.take_journal().is_empty());
    }

    #[test]
    fn private_credential_read_rules() {
        let mut r = setup();
        r.issue_credential(&ctx(acct(2)), acct(3), new_credential("P", false))
            .unwrap();

        // Subject and admin may read.
        assert!(r.get_credential(&ctx(acct(3)), &acct(3), 0).is_ok());
        assert!(r.get_credential(&ctx(acct(1)), &acct(3), 0).is_ok());
        // The issuer holds no special read right.
        assert!(matches!(
            r.get_credential(&ctx(acct(2)), &acct(3), 0),
            Err(RegistryError::Unauthorized(_))
        ));
        // Strangers may not.
        assert!(matches!(
            r.get_credential(&ctx(acct(8)), &acct(3), 0),
            Err(RegistryError::Unauthorized(_))
        ));
    }

    #[test]
    fn invalid_index_reported_before_authorization() {
        let r = setup();
        let err = r.get_credential(&ctx(acct(8)), &acct(3), 99).unwrap_err();
        assert_eq!(
            err,
            RegistryError::InvalidIndex {
                subject: acct(3),
                index: 99,
                count: 0
            }
        );
    }

    #[test]
    fn allow_verifier_grants_read() {
        let mut r = setup();
        r.issue_credential(&ctx(acct(2)), acct(3), new_credential("P", false))
            .unwrap();
        r.take_journal();

        r.allow_verifier(&ctx(acct(3)), acct(3), 0, acct(8)).unwrap();
        assert_eq!(r.get_credential(&ctx(acct(8)), &acct(3), 0).unwrap().title, "P");
        assert_eq!(r.take_journal().events.len(), 1);

        // Duplicate grant writes nothing but is still announced.
        r.allow_verifier(&ctx(acct(3)), acct(3), 0, acct(8)).unwrap();
        let journal = r.take_journal();
        assert!(journal.changes.is_empty());
        assert_eq!(journal.events.len(), 1);
        let rec = r.get_credential(&ctx(acct(3)), &acct(3), 0).unwrap();
        assert_eq!(rec.allowed_verifiers, vec![acct(8)]);
    }

    #[test]
    fn only_subject_can_allow_verifier() {
        let mut r = setup();
        r.issue_credential(&ctx(acct(2)), acct(3), new_credential("P", false))
            .unwrap();
        let err = r.allow_verifier(&ctx(acct(1)), acct(3), 0, acct(8)).unwrap_err();
        assert!(matches!(err, RegistryError::Unauthorized(_)));
        let err = r.allow_verifier(&ctx(acct(3)), acct(3), 5, acct(8)).unwrap_err();
        assert_eq!(err.kind(), "invalid_index");
    }

    #[test]
    fn revoke_is_idempotent() {
        let mut r = setup();
        r.issue_credential(&ctx(acct(2)), acct(3), new_credential("M", true))
            .unwrap();
        r.take_journal();

        r.revoke_credential(&ctx(acct(2)), acct(3), 0).unwrap();
        assert_eq!(r.take_journal().events.len(), 1);
        r.revoke_credential(&ctx(acct(2)), acct(3), 0).unwrap();
        assert!(r.take_journal().is_empty());
        assert!(r.get_credential(&ctx(acct(3)), &acct(3), 0).unwrap().is_revoked);
    }

    #[test]
    fn any_issuer_may_revoke() {
        let mut r = setup();
        r.assign_role(&ctx(acct(1)), acct(6), Role::Issuer).unwrap();
        r.issue_credential(&ctx(acct(2)), acct(3), new_credential("M", true))
            .unwrap();
        r.revoke_credential(&ctx(acct(6)), acct(3), 0).unwrap();
        assert!(r.get_credential(&ctx(acct(3)), &acct(3), 0).unwrap().is_revoked);
    }

    #[test]
    fn revoke_rejects_non_issuer_and_bad_index() {
        let mut r = setup();
        r.issue_credential(&ctx(acct(2)), acct(3), new_credential("M", true))
            .unwrap();
        assert!(matches!(
            r.revoke_credential(&ctx(acct(3)), acct(3), 0),
            Err(RegistryError::Unauthorized(_))
        ));
        assert_eq!(
            r.revoke_credential(&ctx(acct(2)), acct(3), 1).unwrap_err().kind(),
            "invalid_index"
        );
    }

    #[test]
    fn public_subsequence_preserves_order() {
        let mut r = setup();
        for (title, public) in [("A", true), ("B", false), ("C", true), ("D", false)] {
            r.issue_credential(&ctx(acct(2)), acct(3), new_credential(title, public))
                .unwrap();
        }
        let titles: Vec<String> = r
            .get_public_credentials(&acct(3))
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["A", "C"]);
        assert!(r.get_public_credentials(&acct(99)).is_empty());
    }

    #[test]
    fn get_all_is_owner_only() {
        let mut r = setup();
        r.issue_credential(&ctx(acct(2)), acct(3), new_credential("A", true))
            .unwrap();
        r.issue_credential(&ctx(acct(2)), acct(3), new_credential("B", false))
            .unwrap();
        assert_eq!(r.get_all_credentials(&ctx(acct(3)), &acct(3)).unwrap().len(), 2);
        // Not even the admin.
        assert!(r.get_all_credentials(&ctx(acct(1)), &acct(3)).is_err());
    }

    #[test]
    fn verify_reports_expiry() {
        let mut r = setup();
        let mut cred = new_credential("Temp", true);
        cred.expires_at = T0 + 86_400;
        r.issue_credential(&ctx(acct(2)), acct(3), cred).unwrap();

        let now = r.verify_credential(&ctx(acct(9)), &acct(3), 0).unwrap();
        assert!(now.is_valid);

        let later = RequestContext::new(acct(9), T0 + 86_401);
        let v = r.verify_credential(&later, &acct(3), 0).unwrap();
        assert!(!v.is_valid);
        assert!(v.is_expired);
        assert!(!v.is_revoked);
    }

    #[test]
    fn verify_batch_isolates_failures() {
        let mut r = setup();
        r.issue_credential(&ctx(acct(2)), acct(3), new_credential("Pub", true))
            .unwrap();
        r.issue_credential(&ctx(acct(2)), acct(3), new_credential("Priv", false))
            .unwrap();

        let results = r.verify_batch(&ctx(acct(9)), &[(acct(3), 0), (acct(3), 1), (acct(3), 7)]);
        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().unwrap().is_valid);
        assert_eq!(results[1].as_ref().unwrap_err().kind(), "unauthorized");
        assert_eq!(results[2].as_ref().unwrap_err().kind(), "invalid_index");
    }

    #[test]
    fn new_credential_expiry_defaults_to_never() {
        let json = r#"{"title":"T","issuer_name":"I","document_hash":"H","is_public":true}"#;
        let cred: NewCredential = serde_json::from_str(json).unwrap();
        assert_eq!(cred.expires_at, NEVER_EXPIRES);
    }

    #[test]
    fn snapshot_restores_state() {
        let mut r = setup();
        r.issue_credential(&ctx(acct(2)), acct(3), new_credential("A", true))
            .unwrap();
        let snapshot = RegistrySnapshot {
            admin: r.admin(),
            roles: r.roles.clone(),
            credentials: r.credentials.clone(),
        };
        let restored = IdentityRegistry::from_snapshot(snapshot);
        assert_eq!(restored.role_of(&acct(2)), Role::Issuer);
        assert_eq!(restored.credential_count(&acct(3)), 1);
    }
}
