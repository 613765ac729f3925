//! # Registry Configuration & Constants
//!
//! Limits, defaults, and version strings shared by the registry, its
//! storage, and the node binary. Runtime settings (ports, data directory)
//! are parsed by the node CLI and fall back to the defaults defined here.

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// Registry protocol version. Bump when the persisted layout or the event
/// schema changes.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Input Limits
// ---------------------------------------------------------------------------

/// Maximum credential title length in bytes.
pub const MAX_TITLE_LENGTH: usize = 256;

/// Maximum issuer name length in bytes.
pub const MAX_ISSUER_NAME_LENGTH: usize = 256;

/// Maximum document hash length in bytes. A CIDv1 in base32 is about 60
/// characters; the headroom covers gateway-style references.
pub const MAX_DOCUMENT_HASH_LENGTH: usize = 512;

/// Maximum number of entries in one batch verification request.
pub const MAX_BATCH_VERIFICATIONS: usize = 256;

/// Default number of events returned by an event query without a limit.
pub const DEFAULT_EVENT_PAGE_SIZE: usize = 1_000;

/// Largest page an API event query may request.
pub const MAX_EVENT_PAGE_SIZE: usize = 10_000;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// Capacity of the committed-event broadcast channel. Subscribers that
/// fall further behind than this lose the oldest events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Header carrying the authenticated caller account on API requests.
pub const CALLER_HEADER: &str = "x-caller";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_positive() {
        assert!(MAX_TITLE_LENGTH > 0);
        assert!(MAX_ISSUER_NAME_LENGTH > 0);
        assert!(MAX_DOCUMENT_HASH_LENGTH > 0);
        assert!(MAX_BATCH_VERIFICATIONS > 0);
        assert!(DEFAULT_EVENT_PAGE_SIZE > 0);
    }

    #[test]
    fn default_ports_are_distinct() {
        assert_ne!(DEFAULT_RPC_PORT, DEFAULT_METRICS_PORT);
    }

    #[test]
    fn caller_header_is_lowercase() {
        // http::HeaderName requires lowercase for static names.
        assert_eq!(CALLER_HEADER, CALLER_HEADER.to_lowercase());
    }
}
