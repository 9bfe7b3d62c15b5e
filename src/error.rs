use thiserror::Error;
use std::io;

/// Error type for RTP operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Packet shorter than its fixed header requires
    #[error("packet too short: need {required} bytes but have {available}")]
    TooShort {
        required: usize,
        available: usize,
    },

    /// Version field is not 2
    #[error("invalid protocol version: {0}")]
    BadVersion(u8),

    /// Padding byte is zero or exceeds the remaining length
    #[error("packet padding length is invalid")]
    InconsistentPadding,

    /// Header extension runs past the end of the packet
    #[error("header extension overruns packet")]
    ExtensionOverrun,

    /// RTCP length field disagrees with the buffer
    #[error("RTCP packet length is invalid")]
    BadLength,

    /// No codec registered for a payload type
    #[error("no codec registered for payload type {0}")]
    UnknownPayloadType(u8),

    /// Payload size does not fit the codec's sample layout
    #[error("frame size {0} is invalid for codec")]
    BadFrameSize(usize),

    /// Operation requires a bound session
    #[error("session is not bound")]
    NotBound,

    /// Operation on a closed session
    #[error("session is already closed")]
    AlreadyClosed,

    /// Remote source announced our own SSRC.
    ///
    /// Part of the session error surface but never returned by this
    /// crate's session: a collision is resolved in place by rerolling the
    /// local SSRC and is reported through the `on_rtcp` hook as
    /// [`crate::session::RtcpNotice::LocalSsrcChanged`].
    #[error("SSRC collision with remote source {0:#010x}")]
    SsrcCollision(u32),

    /// Invalid parameter for an RTP operation
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// IO error when sending/receiving packets
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let short = Error::TooShort { required: 12, available: 4 };
        assert_eq!(short.to_string(), "packet too short: need 12 bytes but have 4");

        let version = Error::BadVersion(0);
        assert_eq!(version.to_string(), "invalid protocol version: 0");

        let io_err = Error::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(io_err.to_string().contains("IO error"));
    }

    #[test]
    fn test_ssrc_collision_format() {
        let err = Error::SsrcCollision(0xabcd);
        assert_eq!(err.to_string(), "SSRC collision with remote source 0x0000abcd");
    }
}
