use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use super::codec::decode_interval;

/// IGMP message type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Membership Query
    Query = 0x11,
    /// Version 3 Membership Report
    Report = 0x22,
}

/// Group record types carried in a Version 3 Membership Report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Current state: INCLUDE filter mode
    IsInclude = 1,
    /// Current state: EXCLUDE filter mode
    IsExclude = 2,
    /// Filter mode changed to INCLUDE
    ChangeToInclude = 3,
    /// Filter mode changed to EXCLUDE
    ChangeToExclude = 4,
    /// Source list change, unused without source filtering
    AllowNewSources = 5,
    /// Source list change, unused without source filtering
    BlockOldSources = 6,
}

impl RecordType {
    /// Returns whether the record announces a listener in EXCLUDE mode
    pub fn is_exclude(self) -> bool {
        matches!(self, RecordType::IsExclude | RecordType::ChangeToExclude)
    }

    /// Returns whether the record announces INCLUDE mode
    pub fn is_include(self) -> bool {
        matches!(self, RecordType::IsInclude | RecordType::ChangeToInclude)
    }
}

impl TryFrom<u8> for RecordType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RecordType::IsInclude),
            2 => Ok(RecordType::IsExclude),
            3 => Ok(RecordType::ChangeToInclude),
            4 => Ok(RecordType::ChangeToExclude),
            5 => Ok(RecordType::AllowNewSources),
            6 => Ok(RecordType::BlockOldSources),
            other => Err(other),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordType::IsInclude => "is_inc",
            RecordType::IsExclude => "is_exc",
            RecordType::ChangeToInclude => "to_inc",
            RecordType::ChangeToExclude => "to_exc",
            RecordType::AllowNewSources => "allow",
            RecordType::BlockOldSources => "block",
        };
        f.write_str(name)
    }
}

/// Membership Query (RFC 3376 section 4.1)
///
/// A zero group address makes this a General Query; anything else is a
/// Group-Specific Query. Source lists are never produced, and on receipt
/// only their count is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryMessage {
    /// Max Resp Code, an encoded interval in tenths of a second
    pub max_resp_code: u8,
    /// Checksum as read from the wire; recomputed on serialization
    pub checksum: u16,
    /// Group being queried, unspecified for a General Query
    pub group_address: Ipv4Addr,
    /// Suppress Router-Side Processing flag
    pub suppress: bool,
    /// Querier's Robustness Variable (3 bits)
    pub qrv: u8,
    /// Querier's Query Interval Code, an encoded interval in seconds
    pub qqic: u8,
    /// Number of source addresses following the fixed header
    pub num_sources: u16,
}

impl QueryMessage {
    /// Creates a General Query
    pub fn general(max_resp_code: u8, qrv: u8, qqic: u8) -> Self {
        Self::group_specific(Ipv4Addr::UNSPECIFIED, max_resp_code, qrv, qqic, false)
    }

    /// Creates a Group-Specific Query
    pub fn group_specific(
        group_address: Ipv4Addr,
        max_resp_code: u8,
        qrv: u8,
        qqic: u8,
        suppress: bool,
    ) -> Self {
        QueryMessage {
            max_resp_code,
            checksum: 0,
            group_address,
            suppress,
            qrv: qrv.min(crate::core::MAX_ROBUSTNESS),
            qqic,
            num_sources: 0,
        }
    }

    /// Returns whether this is a General Query
    pub fn is_general(&self) -> bool {
        self.group_address.is_unspecified()
    }

    /// Maximum time a host may wait before answering
    pub fn max_resp_time(&self) -> Duration {
        Duration::from_millis(u64::from(decode_interval(self.max_resp_code)) * 100)
    }

    /// Querier's query interval, or `None` when not advertised
    pub fn query_interval(&self) -> Option<Duration> {
        match decode_interval(self.qqic) {
            0 => None,
            secs => Some(Duration::from_secs(u64::from(secs))),
        }
    }
}

/// Version 3 Membership Report header (RFC 3376 section 4.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportMessage {
    /// Checksum as read from the wire
    pub checksum: u16,
    /// Number of group records announced by the header
    pub num_records: u16,
}

/// A single group record of a Membership Report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupRecord {
    /// Kind of record
    pub record_type: RecordType,
    /// Group the record is about
    pub multicast_address: Ipv4Addr,
}

impl GroupRecord {
    /// Creates a record without sources
    pub fn new(record_type: RecordType, multicast_address: Ipv4Addr) -> Self {
        GroupRecord {
            record_type,
            multicast_address,
        }
    }
}

impl fmt::Display for GroupRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.record_type, self.multicast_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::encode_interval;

    #[test]
    fn test_query_creation() {
        let general = QueryMessage::general(100, 2, 125);
        assert!(general.is_general());
        assert_eq!(general.max_resp_time(), Duration::from_secs(10));
        assert_eq!(general.query_interval(), Some(Duration::from_secs(125)));

        let specific =
            QueryMessage::group_specific(Ipv4Addr::new(239, 1, 1, 1), 10, 9, 0, true);
        assert!(!specific.is_general());
        assert_eq!(specific.qrv, 7);
        assert!(specific.suppress);
        assert_eq!(specific.query_interval(), None);
    }

    #[test]
    fn test_max_resp_time_uses_float_encoding() {
        let query = QueryMessage::general(encode_interval(1000), 2, 0);
        assert!(query.max_resp_time() >= Duration::from_secs(100));
    }

    #[test]
    fn test_record_type_conversion() {
        assert_eq!(RecordType::try_from(2), Ok(RecordType::IsExclude));
        assert_eq!(RecordType::try_from(0), Err(0));
        assert_eq!(RecordType::try_from(7), Err(7));
        assert!(RecordType::ChangeToExclude.is_exclude());
        assert!(RecordType::IsInclude.is_include());
        assert!(!RecordType::AllowNewSources.is_include());
        assert!(!RecordType::BlockOldSources.is_exclude());
    }

    #[test]
    fn test_record_display() {
        let record = GroupRecord::new(RecordType::ChangeToInclude, Ipv4Addr::new(239, 1, 1, 1));
        assert_eq!(record.to_string(), "to_inc 239.1.1.1");
    }
}
