// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # credreg Protocol — Core Library
//!
//! Shared vocabulary for the credreg credential registry: who the accounts
//! are, what a credential record holds, which events the registry emits,
//! and how all of it is persisted.
//!
//! The registry state machine itself lives in `credreg-contracts`; this
//! crate has no authorization logic.
//!
//! ## Architecture
//!
//! - **identity** — account identifiers, roles, and the per-call request
//!   context (caller + transaction time).
//! - **credential** — credential records, validity, and verification results.
//! - **events** — the registry event log, filters, and replayed statistics.
//! - **storage** — the transactional store trait with in-memory and sled
//!   implementations.
//! - **config** — limits and defaults.
//!
//! ## Design Philosophy
//!
//! 1. The document behind a credential is never inspected. A hash is a string.
//! 2. Time and caller are parameters, never globals.
//! 3. A call either commits completely or leaves no trace.

pub mod config;
pub mod credential;
pub mod events;
pub mod identity;
pub mod storage;

pub use credential::{CredentialRecord, Verification, NEVER_EXPIRES};
pub use events::{EventFilter, EventKind, EventRecord, RegistryEvent, RegistryStats};
pub use identity::{AccountId, RequestContext, Role};
