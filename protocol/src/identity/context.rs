//! Per-call request context.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::account::AccountId;

/// The caller and the time of a single registry call.
///
/// Every operation takes its caller and clock from here rather than from
/// ambient globals, so the same call replayed with the same context always
/// produces the same outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// The authenticated account making the call.
    pub caller: AccountId,
    /// Transaction time as unix seconds.
    pub now: u64,
}

impl RequestContext {
    /// Context with an explicit timestamp.
    pub fn new(caller: AccountId, now: u64) -> Self {
        Self { caller, now }
    }

    /// Context stamped with the current wall-clock time.
    pub fn at_current_time(caller: AccountId) -> Self {
        Self {
            caller,
            now: unix_now(),
        }
    }
}

/// Current unix time in seconds. Clamped to zero for clocks set before 1970.
pub fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}
