//! IGMPv3 wire format
//!
//! Pure functions converting between [`QueryMessage`] / [`GroupRecord`]
//! values and their on-wire byte layout, plus the interval float encoding
//! and the Internet checksum (RFC 1071) both message kinds carry.

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::message::{GroupRecord, MessageType, QueryMessage, RecordType, ReportMessage};
use crate::core::CodecError;

/// Fixed part of a Membership Query
pub const QUERY_LEN: usize = 12;

/// Fixed part of a Membership Report
pub const REPORT_HEADER_LEN: usize = 8;

/// Fixed part of a group record
pub const RECORD_LEN: usize = 8;

/// Router Alert IP option (RFC 2113): "router shall examine packet"
pub const ROUTER_ALERT: [u8; 4] = [0x94, 0x04, 0x00, 0x00];

/// Largest interval the 8-bit float encoding can represent
pub const MAX_INTERVAL: u32 = 31_744;

const IPV4_MIN_HEADER_LEN: usize = 20;

/// Encodes an interval (tenths of a second for response codes, seconds for
/// QQIC) into the RFC 3376 8-bit float.
///
/// Values below 128 are exact. Larger values round up to the next
/// representable value and saturate at [`MAX_INTERVAL`].
pub fn encode_interval(value: u32) -> u8 {
    if value < 128 {
        return value as u8;
    }
    let value = value.min(MAX_INTERVAL);

    // index of the leading 1, between 7 and 14
    let top = 31 - value.leading_zeros();
    let exponent = (top - 7) as u8;
    let mantissa = ((value >> (top - 4)) & 0x0F) as u8;
    let code = 0x80 | (exponent << 4) | mantissa;

    // a mantissa carry lands on the next exponent, which is still the next
    // representable value
    if decode_interval(code) < value {
        code + 1
    } else {
        code
    }
}

/// Decodes an RFC 3376 8-bit float interval
pub fn decode_interval(code: u8) -> u32 {
    if code < 128 {
        return u32::from(code);
    }
    let exponent = u32::from((code & 0x70) >> 4);
    let mantissa = u32::from(code & 0x0F);
    (mantissa | 0x10) << (exponent + 3)
}

/// Calculates the Internet checksum of `data`
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
    }
    if let Some(&byte) = chunks.remainder().first() {
        sum += u32::from(byte) << 8;
    }

    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}

/// Validates a message whose checksum field is filled in
pub fn verify_checksum(data: &[u8]) -> bool {
    checksum(data) == 0
}

/// Checks that the Router Alert option immediately precedes `offset`, the
/// start of the IGMP message inside `frame`. The option can only be present
/// when the IP header is longer than its fixed 20 bytes.
pub fn has_router_alert(frame: &[u8], offset: usize) -> bool {
    offset >= IPV4_MIN_HEADER_LEN + ROUTER_ALERT.len()
        && frame.len() >= offset
        && frame[offset - ROUTER_ALERT.len()..offset] == ROUTER_ALERT
}

fn ensure_len(bytes: &[u8], needed: usize) -> Result<(), CodecError> {
    if bytes.len() < needed {
        Err(CodecError::Malformed {
            needed,
            actual: bytes.len(),
        })
    } else {
        Ok(())
    }
}

fn expect_type(found: u8, expected: MessageType) -> Result<(), CodecError> {
    if found == expected as u8 {
        Ok(())
    } else {
        Err(CodecError::WrongType {
            expected: expected as u8,
            found,
        })
    }
}

/// Parses a Membership Query
///
/// The checksum covers the fixed header and any source addresses; octets
/// past those are ignored.
pub fn parse_query(bytes: &[u8]) -> Result<QueryMessage, CodecError> {
    ensure_len(bytes, QUERY_LEN)?;
    expect_type(bytes[0], MessageType::Query)?;

    let mut buf = &bytes[1..QUERY_LEN];
    let max_resp_code = buf.get_u8();
    let checksum = buf.get_u16();
    let group_address = Ipv4Addr::from(buf.get_u32());
    let flags = buf.get_u8();
    let qqic = buf.get_u8();
    let num_sources = buf.get_u16();

    let total = QUERY_LEN + 4 * usize::from(num_sources);
    ensure_len(bytes, total)?;
    if !verify_checksum(&bytes[..total]) {
        return Err(CodecError::BadChecksum);
    }

    Ok(QueryMessage {
        max_resp_code,
        checksum,
        group_address,
        suppress: flags & 0x08 != 0,
        qrv: flags & 0x07,
        qqic,
        num_sources,
    })
}

/// Parses a Version 3 Membership Report
///
/// Source addresses and auxiliary data are skipped. Records of a type this
/// engine does not know are left out of the returned list; the header still
/// reports the count seen on the wire.
pub fn parse_report(bytes: &[u8]) -> Result<(ReportMessage, Vec<GroupRecord>), CodecError> {
    ensure_len(bytes, REPORT_HEADER_LEN)?;
    expect_type(bytes[0], MessageType::Report)?;

    let mut header = &bytes[2..REPORT_HEADER_LEN];
    let checksum = header.get_u16();
    header.advance(2);
    let num_records = header.get_u16();

    let mut records = Vec::with_capacity(usize::from(num_records));
    let mut offset = REPORT_HEADER_LEN;
    for _ in 0..num_records {
        ensure_len(bytes, offset + RECORD_LEN)?;
        let mut buf = &bytes[offset..offset + RECORD_LEN];
        let record_type = buf.get_u8();
        let aux_words = usize::from(buf.get_u8());
        let num_sources = usize::from(buf.get_u16());
        let multicast_address = Ipv4Addr::from(buf.get_u32());

        offset += RECORD_LEN + 4 * (num_sources + aux_words);
        if let Ok(record_type) = RecordType::try_from(record_type) {
            records.push(GroupRecord::new(record_type, multicast_address));
        }
    }
    ensure_len(bytes, offset)?;

    if !verify_checksum(&bytes[..offset]) {
        return Err(CodecError::BadChecksum);
    }

    Ok((
        ReportMessage {
            checksum,
            num_records,
        },
        records,
    ))
}

fn finish(mut buf: BytesMut) -> Bytes {
    let sum = checksum(&buf);
    buf[2..4].copy_from_slice(&sum.to_be_bytes());
    buf.freeze()
}

/// Serializes a Membership Query with a freshly computed checksum
///
/// Source lists are never sent, so the source count is written as zero.
pub fn serialize_query(query: &QueryMessage) -> Bytes {
    let mut buf = BytesMut::with_capacity(QUERY_LEN);
    buf.put_u8(MessageType::Query as u8);
    buf.put_u8(query.max_resp_code);
    buf.put_u16(0);
    buf.put_slice(&query.group_address.octets());
    buf.put_u8((u8::from(query.suppress) << 3) | (query.qrv & 0x07));
    buf.put_u8(query.qqic);
    buf.put_u16(0);
    finish(buf)
}

/// Serializes a Membership Report holding `records`
pub fn serialize_report(records: &[GroupRecord]) -> Bytes {
    let mut buf = BytesMut::with_capacity(REPORT_HEADER_LEN + RECORD_LEN * records.len());
    buf.put_u8(MessageType::Report as u8);
    buf.put_u8(0);
    buf.put_u16(0);
    buf.put_u16(0);
    buf.put_u16(records.len() as u16);
    for record in records {
        buf.put_u8(record.record_type as u8);
        buf.put_u8(0);
        buf.put_u16(0);
        buf.put_slice(&record.multicast_address.octets());
    }
    finish(buf)
}

/// Wraps an IGMP message in a 24-byte IPv4 header ending in Router Alert
#[cfg(test)]
pub(crate) fn encapsulate(message: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(24 + message.len());
    frame.put_u8(0x46);
    frame.put_u8(0xC0);
    frame.put_u16((24 + message.len()) as u16);
    frame.put_u32(0);
    frame.put_u8(1);
    frame.put_u8(2);
    frame.put_u16(0);
    frame.put_slice(&[10, 0, 0, 1]);
    frame.put_slice(&[224, 0, 0, 22]);
    frame.put_slice(&ROUTER_ALERT);
    frame.put_slice(message);
    frame.freeze()
}
