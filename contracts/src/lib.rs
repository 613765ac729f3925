//! # credreg Contracts
//!
//! The credential registry state machine and the executor that persists it.
//!
//! - **Identity Registry** — role assignment, credential issuance and
//!   revocation, per-credential verifier grants, and read authorization.
//! - **Ledger** — serializes calls, commits each call's journal atomically
//!   to a [`RegistryStore`](credreg_protocol::storage::RegistryStore), and
//!   broadcasts the committed events.
//!
//! ## Design Principles
//!
//! 1. Validate first, mutate second. A rejected call leaves no trace.
//! 2. Roles are a closed enum, not strings.
//! 3. The caller and the transaction time arrive in a
//!    [`RequestContext`](credreg_protocol::RequestContext); nothing reads a
//!    clock or an ambient identity.

pub mod identity_registry;
pub mod ledger;

pub use identity_registry::{IdentityRegistry, NewCredential, RegistryError};
pub use ledger::{Ledger, LedgerError};
