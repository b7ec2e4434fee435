//! Protocol implementation module
//!
//! This module defines the IGMPv3 messages and their encoding/decoding.
//! The state machines consuming them live in [`crate::client`] and
//! [`crate::router`].

pub mod codec;
pub mod message;

pub use self::codec::{
    checksum, decode_interval, encode_interval, has_router_alert, parse_query, parse_report,
    serialize_query, serialize_report, verify_checksum,
};
pub use self::message::{GroupRecord, MessageType, QueryMessage, RecordType, ReportMessage};

use crate::core::CodecError;

/// Runs the inbound checks shared by both roles: Router Alert before
/// `offset`, then `parse` for type and checksum. Rejected frames are logged
/// and yield `None`.
pub(crate) fn accept_frame<T>(
    frame: &[u8],
    offset: usize,
    parse: impl FnOnce(&[u8]) -> Result<T, CodecError>,
) -> Option<T> {
    if !has_router_alert(frame, offset) {
        tracing::warn!(offset, "Dropped packet without alert option");
        return None;
    }
    match parse(&frame[offset..]) {
        Ok(message) => Some(message),
        Err(CodecError::WrongType { found, .. }) => {
            tracing::trace!(message_type = found, "ignoring message of another kind");
            None
        }
        Err(CodecError::BadChecksum) => {
            tracing::warn!("Dropped wrong checksum packet");
            None
        }
        Err(e) => {
            tracing::debug!(error = %e, "Dropped malformed packet");
            None
        }
    }
}

/// Logs every record of an outgoing or incoming report
pub(crate) fn log_records(context: &str, records: &[GroupRecord]) {
    tracing::debug!(count = records.len(), "{}: report", context);
    for record in records {
        tracing::debug!("\t{}", record);
    }
}
