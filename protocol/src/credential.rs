//! # Credential Records
//!
//! A credential is a claim an issuer makes about a subject account: a title,
//! the issuing organisation's name, and the content address of a document
//! held off-registry (typically an IPFS CID). The registry never looks inside
//! the document; the hash is an opaque string.
//!
//! Records live in a per-subject, append-only sequence. A record's position
//! in that sequence is its index, and indices are never reused.
//!
//! ## Mutability
//!
//! | Field               | After issuance                 |
//! |---------------------|--------------------------------|
//! | `title`, `issuer_name`, `document_hash` | immutable  |
//! | `is_public`         | immutable                      |
//! | `issued_at`, `expires_at`, `issued_by`  | immutable  |
//! | `is_revoked`        | false -> true, once            |
//! | `allowed_verifiers` | grow-only set                  |

use serde::{Deserialize, Serialize};

use crate::identity::AccountId;

/// `expires_at` value meaning the credential never expires.
pub const NEVER_EXPIRES: u64 = 0;

/// A credential held by a subject account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Human-readable credential title (e.g., "College Degree").
    pub title: String,
    /// Name of the issuing organisation as stated by the issuer.
    pub issuer_name: String,
    /// Content address of the off-registry document.
    pub document_hash: String,
    /// Whether anyone may read this record.
    pub is_public: bool,
    /// Issuance time, unix seconds.
    pub issued_at: u64,
    /// Expiry time, unix seconds. [`NEVER_EXPIRES`] for no expiry.
    pub expires_at: u64,
    /// Set once by a revocation; never cleared.
    pub is_revoked: bool,
    /// Accounts granted read access to this record while it is private.
    /// Insertion-ordered, no duplicates.
    pub allowed_verifiers: Vec<AccountId>,
    /// The issuer account that created the record.
    pub issued_by: AccountId,
}

impl CredentialRecord {
    /// Whether the record has passed its expiry at time `now`.
    ///
    /// The expiry instant itself still counts as unexpired.
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at != NEVER_EXPIRES && now > self.expires_at
    }

    /// Effective validity at time `now`: not revoked and not expired.
    pub fn is_valid_at(&self, now: u64) -> bool {
        !self.is_revoked && !self.is_expired_at(now)
    }

    /// Whether `account` holds an explicit read grant on this record.
    pub fn is_verifier(&self, account: &AccountId) -> bool {
        self.allowed_verifiers.contains(account)
    }

    /// Adds a read grant. Returns `false` if the account already had one.
    pub fn grant(&mut self, verifier: AccountId) -> bool {
        if self.is_verifier(&verifier) {
            return false;
        }
        self.allowed_verifiers.push(verifier);
        true
    }
}

/// Outcome of checking one credential at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    /// The credential's subject.
    pub subject: AccountId,
    /// The credential's index in the subject's sequence.
    pub index: u64,
    /// Credential title.
    pub title: String,
    /// Issuing organisation name.
    pub issuer_name: String,
    /// Not revoked and not expired.
    pub is_valid: bool,
    /// The credential has been revoked.
    pub is_revoked: bool,
    /// The credential is past its expiry.
    pub is_expired: bool,
    /// Time of the check, unix seconds.
    pub verified_at: u64,
}

impl Verification {
    /// Evaluates `record` at time `now`.
    pub fn of(subject: AccountId, index: u64, record: &CredentialRecord, now: u64) -> Self {
        Self {
            subject,
            index,
            title: record.title.clone(),
            issuer_name: record.issuer_name.clone(),
            is_valid: record.is_valid_at(now),
            is_revoked: record.is_revoked,
            is_expired: record.is_expired_at(now),
            verified_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(expires_at: u64) -> CredentialRecord {
        CredentialRecord {
            title: "Membership".into(),
            issuer_name: "Club".into(),
            document_hash: "QmMember123".into(),
            is_public: true,
            issued_at: 1_000,
            expires_at,
            is_revoked: false,
            allowed_verifiers: Vec::new(),
            issued_by: AccountId::from_bytes([9; 20]),
        }
    }

    #[test]
    fn zero_expiry_never_expires() {
        let r = record(NEVER_EXPIRES);
        assert!(!r.is_expired_at(u64::MAX));
        assert!(r.is_valid_at(u64::MAX));
    }

    #[test]
    fn expiry_instant_is_still_valid() {
        let r = record(2_000);
        assert!(r.is_valid_at(2_000));
        assert!(!r.is_valid_at(2_001));
        assert!(r.is_expired_at(2_001));
    }

    #[test]
    fn revoked_record_is_invalid() {
        let mut r = record(NEVER_EXPIRES);
        r.is_revoked = true;
        assert!(!r.is_valid_at(1_500));
    }

    #[test]
    fn grants_are_deduplicated() {
        let mut r = record(NEVER_EXPIRES);
        let v = AccountId::from_bytes([3; 20]);
        assert!(r.grant(v));
        assert!(!r.grant(v));
        assert_eq!(r.allowed_verifiers, vec![v]);
    }

    #[test]
    fn verification_reports_expired_and_revoked() {
        let mut r = record(2_000);
        r.is_revoked = true;
        let v = Verification::of(AccountId::from_bytes([1; 20]), 4, &r, 3_000);
        assert!(!v.is_valid);
        assert!(v.is_revoked);
        assert!(v.is_expired);
        assert_eq!(v.index, 4);
        assert_eq!(v.verified_at, 3_000);
    }
}
