//! IGMPv3: Internet Group Management Protocol, Version 3 (RFC 3376)
//!
//! This library implements the wire format of IGMPv3 Membership Queries and
//! Reports together with two sans-IO state machines: a host-side [`Client`]
//! reporting its group memberships, and a router-side [`Router`] acting as
//! querier. Source-specific filtering is not supported; every membership is
//! an EXCLUDE {} (any source) membership.
//!
//! Both machines take the current [`tokio::time::Instant`] as an argument
//! and push outgoing frames into a [`tokio::sync::mpsc`] channel. The
//! [`network::run`] driver feeds them from a channel of inbound frames and
//! fires their timers.
pub mod client;
pub mod core;
pub mod network;
pub mod protocol;
pub mod router;
pub mod time;
pub mod util;

// Re-export commonly used items
pub use client::{Client, ClientCommand};
pub use core::{ClientConfig, CodecError, Error, InterfaceId, Result, RouterConfig};
pub use network::{Engine, InboundFrame, Input, Outgoing};
pub use protocol::{GroupRecord, QueryMessage, RecordType, ReportMessage};
pub use router::Router;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
