//! Shared event names and field formatting for structured log lines.
//!
//! Library code emits `tracing` events and never initializes a global
//! subscriber; binaries and tests own one-time `tracing_subscriber` setup at
//! process boundaries.

/// Stable event names, `<flow>_<occurrence>`.
pub mod events {
    pub const INBOUND_RECEIVE: &str = "inbound_receive";
    pub const INBOUND_DROP_TIMEOUT: &str = "inbound_drop_timeout";
    pub const INBOUND_READ_FAILED: &str = "inbound_read_failed";
    pub const INBOUND_CLOSED: &str = "inbound_closed";
    pub const OUTBOUND_DISPATCH: &str = "outbound_dispatch";
    pub const OUTBOUND_WRITE_FAILED: &str = "outbound_write_failed";
    pub const OUTBOUND_STOPPED: &str = "outbound_stopped";
}

/// Field formatting helpers shared across flows.
pub mod fields {
    /// Compact payload description: length plus a short lossy prefix.
    pub fn format_payload(payload: &[u8]) -> String {
        const PREVIEW_LEN: usize = 32;
        let preview = String::from_utf8_lossy(&payload[..payload.len().min(PREVIEW_LEN)]);
        if payload.len() > PREVIEW_LEN {
            format!("{} bytes [{preview}…]", payload.len())
        } else {
            format!("{} bytes [{preview}]", payload.len())
        }
    }
}
