//! # Identity Module
//!
//! Who is calling, and what they are allowed to do.
//!
//! - **account** — 20-byte account identifiers (`0x` + 40 hex digits).
//! - **role** — the closed set of registry roles.
//! - **context** — the per-call [`RequestContext`] carrying the caller and
//!   the transaction time.
//!
//! Caller identity is bound outside the registry (wallet signatures at the
//! gateway). Nothing in this module verifies signatures; it only gives the
//! already-authenticated caller a strong type.

pub mod account;
pub mod context;
pub mod role;

pub use account::{AccountId, AccountIdError, ACCOUNT_ID_LENGTH};
pub use context::RequestContext;
pub use role::{Role, UnknownRole};
