//! Core types for the IGMPv3 engine
//!
//! This module contains the error types, configuration and protocol
//! constants shared by the client and router state machines.

pub mod error;
pub mod serde;
pub mod types;

use std::net::Ipv4Addr;

pub use self::error::{CodecError, Error, Result};
pub use self::types::{is_reportable_group, ClientConfig, InterfaceId, RouterConfig};

/// All-systems group; never reported or tracked
pub const ALL_SYSTEMS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 1);

/// Robustness assumed when a query advertises QRV 0
pub const DEFAULT_ROBUSTNESS: u8 = 2;

/// Largest robustness value the 3-bit QRV field can carry
pub const MAX_ROBUSTNESS: u8 = 7;
