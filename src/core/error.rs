use std::net::Ipv4Addr;
use thiserror::Error;

/// Failures while decoding an IGMP message from the wire
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed message: need {needed} bytes, got {actual}")]
    Malformed { needed: usize, actual: usize },

    #[error("Bad checksum")]
    BadChecksum,

    #[error("Wrong message type: expected {expected:#04x}, found {found:#04x}")]
    WrongType { expected: u8, found: u8 },
}

/// Custom error types for the IGMP engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transmit error: {0}")]
    Transmit(String),

    #[error("Not a reportable multicast group: {0}")]
    InvalidAddress(Ipv4Addr),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new transmit error
    pub fn transmit(msg: impl Into<String>) -> Self {
        Error::Transmit(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::transmit("channel full");
        assert!(matches!(err, Error::Transmit(_)));
        assert_eq!(err.to_string(), "Transmit error: channel full");
    }

    #[test]
    fn test_codec_error_conversion() {
        let err: Error = CodecError::WrongType { expected: 0x11, found: 0x22 }.into();
        assert!(matches!(err, Error::Codec(CodecError::WrongType { .. })));
        assert_eq!(
            err.to_string(),
            "Codec error: Wrong message type: expected 0x11, found 0x22"
        );
    }

    #[test]
    fn test_invalid_address_display() {
        let err = Error::InvalidAddress(Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(err.to_string(), "Not a reportable multicast group: 10.0.0.1");
    }
}
