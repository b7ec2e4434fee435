use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// Index of a router interface, doubling as its output port number
pub type InterfaceId = usize;

/// Returns whether `address` may appear as a group in a membership record
pub fn is_reportable_group(address: Ipv4Addr) -> bool {
    address.is_multicast() && address != super::ALL_SYSTEMS
}

/// Configuration for the host-side membership reporter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Robustness assumed until the first Query teaches the querier's value
    pub robustness: u8,
    /// Upper bound of the random delay between state-change retransmissions
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub unsolicited_report_interval: Duration,
    /// Output on which reports are transmitted
    pub output_port: usize,
    /// Seed for report delays; entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            robustness: super::DEFAULT_ROBUSTNESS,
            unsolicited_report_interval: Duration::from_secs(1),
            output_port: 0,
            seed: None,
        }
    }
}

impl ClientConfig {
    /// Checks the configuration for values the protocol cannot carry
    pub fn validate(&self) -> Result<()> {
        if !(1..=super::MAX_ROBUSTNESS).contains(&self.robustness) {
            return Err(Error::config(format!(
                "robustness must be within 1..={}, got {}",
                super::MAX_ROBUSTNESS,
                self.robustness
            )));
        }
        if self.unsolicited_report_interval.is_zero() {
            return Err(Error::config("unsolicited report interval must be non-zero"));
        }
        Ok(())
    }
}

/// Configuration for the router-side querier
///
/// All values follow RFC 3376 section 8. The group membership interval is a
/// configured constant; [`RouterConfig::default`] derives it from the other
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Number of attached interfaces, numbered from 0
    pub interfaces: usize,
    /// Robustness variable advertised in queries (clamped to 7 on the wire)
    pub robustness: u8,
    /// Interval between steady-state General Queries
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub query_interval: Duration,
    /// Max response time advertised in General Queries
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub query_response_interval: Duration,
    /// Time without a refresh before a group is presumed gone
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub group_membership_interval: Duration,
    /// Interval between General Queries during startup
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub startup_query_interval: Duration,
    /// Number of extra General Queries sent at the startup interval
    pub startup_query_count: u32,
    /// Spacing of Group-Specific Query probes, also their max response time
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub last_member_query_interval: Duration,
    /// Number of Group-Specific Queries sent per probe
    pub last_member_query_count: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        let robustness = super::DEFAULT_ROBUSTNESS;
        let query_interval = Duration::from_secs(125);
        let query_response_interval = Duration::from_secs(10);

        RouterConfig {
            interfaces: 1,
            robustness,
            query_interval,
            query_response_interval,
            group_membership_interval: query_interval * u32::from(robustness)
                + query_response_interval,
            startup_query_interval: query_interval / 4,
            startup_query_count: u32::from(robustness),
            last_member_query_interval: Duration::from_secs(1),
            last_member_query_count: u32::from(robustness),
        }
    }
}

impl RouterConfig {
    /// Time a probed group survives without a refresh
    pub fn last_member_query_time(&self) -> Duration {
        self.last_member_query_interval * self.last_member_query_count
    }

    /// Checks the configuration for values the protocol cannot carry
    pub fn validate(&self) -> Result<()> {
        if self.interfaces == 0 {
            return Err(Error::config("router needs at least one interface"));
        }
        if self.robustness == 0 {
            return Err(Error::config("robustness must be non-zero"));
        }
        if self.last_member_query_count == 0 {
            return Err(Error::config("last member query count must be non-zero"));
        }
        if self.query_interval.is_zero() || self.last_member_query_interval.is_zero() {
            return Err(Error::config("query intervals must be non-zero"));
        }
        if self.query_response_interval >= self.query_interval {
            return Err(Error::config(
                "query response interval must be shorter than the query interval",
            ));
        }
        Ok(())
    }
}
