//! # Registry Events
//!
//! The event log is the registry's history. It is the only way to answer
//! questions like "which accounts have ever been assigned a role" or "how
//! many credentials were issued this month": the registry itself offers no
//! enumeration of subjects.
//!
//! Events are recorded only when a call commits. Each committed event gets
//! a gap-free sequence number, starting at 0, in commit order:
//!
//! ```text
//! seq 0  RoleAssigned       { target: 0xaa.., role: issuer }
//! seq 1  CredentialIssued   { subject: 0xbb.., index: 0, issued_by: 0xaa.., .. }
//! seq 2  VerifierAdded      { subject: 0xbb.., index: 0, verifier: 0xcc.. }
//! seq 3  CredentialRevoked  { subject: 0xbb.., index: 0 }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::identity::{AccountId, Role};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A state change announced by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    /// An admin set an account's role.
    RoleAssigned { target: AccountId, role: Role },
    /// An issuer appended a credential to a subject's sequence.
    CredentialIssued {
        subject: AccountId,
        index: u64,
        title: String,
        issuer_name: String,
        /// The issuing account.
        issued_by: AccountId,
    },
    /// An issuer revoked a credential.
    CredentialRevoked { subject: AccountId, index: u64 },
    /// A subject granted a verifier read access to one credential.
    VerifierAdded {
        subject: AccountId,
        index: u64,
        verifier: AccountId,
    },
}

impl RegistryEvent {
    /// The event's kind, for filtering.
    pub fn kind(&self) -> EventKind {
        match self {
            RegistryEvent::RoleAssigned { .. } => EventKind::RoleAssigned,
            RegistryEvent::CredentialIssued { .. } => EventKind::CredentialIssued,
            RegistryEvent::CredentialRevoked { .. } => EventKind::CredentialRevoked,
            RegistryEvent::VerifierAdded { .. } => EventKind::VerifierAdded,
        }
    }

    /// The account the event is about: the role target or the credential
    /// subject.
    pub fn account(&self) -> &AccountId {
        match self {
            RegistryEvent::RoleAssigned { target, .. } => target,
            RegistryEvent::CredentialIssued { subject, .. }
            | RegistryEvent::CredentialRevoked { subject, .. }
            | RegistryEvent::VerifierAdded { subject, .. } => subject,
        }
    }

    /// The issuing account, for `CredentialIssued` events.
    pub fn issuer(&self) -> Option<&AccountId> {
        match self {
            RegistryEvent::CredentialIssued { issued_by, .. } => Some(issued_by),
            _ => None,
        }
    }
}

/// Discriminant of [`RegistryEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RoleAssigned,
    CredentialIssued,
    CredentialRevoked,
    VerifierAdded,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::RoleAssigned => "role_assigned",
            EventKind::CredentialIssued => "credential_issued",
            EventKind::CredentialRevoked => "credential_revoked",
            EventKind::VerifierAdded => "verifier_added",
        };
        f.write_str(s)
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "role_assigned" => Ok(EventKind::RoleAssigned),
            "credential_issued" => Ok(EventKind::CredentialIssued),
            "credential_revoked" => Ok(EventKind::CredentialRevoked),
            "verifier_added" => Ok(EventKind::VerifierAdded),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

/// A committed event with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the event log.
    pub sequence: u64,
    /// Commit time of the call that produced the event, unix seconds.
    pub committed_at: u64,
    /// The event itself.
    pub event: RegistryEvent,
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Range and content filter over the event log.
///
/// All criteria are optional; an empty filter matches every event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// First sequence number to include.
    #[serde(default)]
    pub from: Option<u64>,
    /// Last sequence number to include (inclusive).
    #[serde(default)]
    pub to: Option<u64>,
    /// Only events of this kind.
    #[serde(default)]
    pub kind: Option<EventKind>,
    /// Only events about this account (role target or credential subject).
    #[serde(default)]
    pub account: Option<AccountId>,
    /// Only credentials issued by this account. Matches `CredentialIssued`
    /// events alone.
    #[serde(default)]
    pub issuer: Option<AccountId>,
    /// Maximum number of records to return.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl EventFilter {
    /// Matches every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to one event kind.
    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Restricts to events about one account.
    pub fn account(mut self, account: AccountId) -> Self {
        self.account = Some(account);
        self
    }

    /// Restricts to credentials issued by one account.
    pub fn issuer(mut self, issuer: AccountId) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Restricts to sequence numbers in `from..=to`.
    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Caps the number of returned records.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Lower sequence bound, defaulting to the start of the log.
    pub fn lower_bound(&self) -> u64 {
        self.from.unwrap_or(0)
    }

    /// Upper sequence bound (inclusive), defaulting to the end of the log.
    pub fn upper_bound(&self) -> u64 {
        self.to.unwrap_or(u64::MAX)
    }

    /// Whether `record` passes the range and content criteria.
    /// The limit is applied by the caller.
    pub fn matches(&self, record: &EventRecord) -> bool {
        if record.sequence < self.lower_bound() || record.sequence > self.upper_bound() {
            return false;
        }
        if let Some(kind) = self.kind {
            if record.event.kind() != kind {
                return false;
            }
        }
        if let Some(account) = &self.account {
            if record.event.account() != account {
                return false;
            }
        }
        if let Some(issuer) = &self.issuer {
            if record.event.issuer() != Some(issuer) {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Aggregate counters reconstructed by replaying the event log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Number of accounts currently holding each role, counting only
    /// accounts that appear in a `RoleAssigned` event.
    pub accounts_by_role: BTreeMap<Role, u64>,
    /// Credentials issued.
    pub credentials_issued: u64,
    /// Credentials revoked.
    pub credentials_revoked: u64,
    /// Issued minus revoked. Expiry is not accounted for.
    pub credentials_active: u64,
    /// Verifier grants recorded.
    pub verifier_grants: u64,
    /// Total events replayed.
    pub total_events: u64,
}

impl RegistryStats {
    /// Replays `events` in order.
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a EventRecord>,
    {
        let mut stats = RegistryStats::default();
        let mut latest_role: HashMap<AccountId, Role> = HashMap::new();

        for record in events {
            stats.total_events += 1;
            match &record.event {
                RegistryEvent::RoleAssigned { target, role } => {
                    latest_role.insert(*target, *role);
                }
                RegistryEvent::CredentialIssued { .. } => stats.credentials_issued += 1,
                RegistryEvent::CredentialRevoked { .. } => stats.credentials_revoked += 1,
                RegistryEvent::VerifierAdded { .. } => stats.verifier_grants += 1,
            }
        }

        for role in latest_role.into_values() {
            *stats.accounts_by_role.entry(role).or_insert(0) += 1;
        }
        stats.credentials_active = stats
            .credentials_issued
            .saturating_sub(stats.credentials_revoked);
        stats
    }
}
