//! Plain RTP/RTCP transport core for narrowband VoIP audio
//!
//! This crate provides RTP packet encoding/decoding, RTCP reports,
//! a jitter buffer, RFC 4733 DTMF events and a UDP session layer —
//! the media substrate a SIP user-agent or gateway sits on top of.
//! There is no WebRTC negotiation, no ICE and no SRTP here.
//!
//! The library is organized into several modules:
//!
//! - `packet`: RTP and RTCP packet definitions and processing
//! - `codec`: payload codecs (G.711 µ-law/A-law, L16) and the registry
//! - `buffer`: sequence-ordered jitter buffer
//! - `dtmf`: telephone-event framing and digit assembly
//! - `stats`: per-stream reception statistics
//! - `session`: RTP session management
//! - `transport`: network transport for RTP/RTCP

mod error;

// Main modules
pub mod buffer;
pub mod codec;
pub mod dtmf;
pub mod packet;
pub mod session;
pub mod stats;
pub mod transport;

// Re-export core types
pub use error::Error;

// Re-export common types from packet module
pub use packet::{is_rtcp, RtpHeader, RtpPacket};
pub use packet::rtcp::{
    NtpTimestamp, RtcpApplicationDefined, RtcpGoodbye, RtcpPacket,
    RtcpReceiverReport, RtcpReportBlock, RtcpSenderReport,
    RtcpSourceDescription,
};

// Re-export session types
pub use session::{RtcpNotice, RtpSession, RtpSessionConfig, RtpSessionStats};

/// The default maximum size for RTP packets in bytes
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1500;

/// Typedef for RTP timestamp values
pub type RtpTimestamp = u32;

/// Typedef for RTP sequence numbers
pub type RtpSequenceNumber = u16;

/// Typedef for RTP synchronization source identifier
pub type RtpSsrc = u32;

/// Typedef for RTP contributing source identifier
pub type RtpCsrc = u32;

/// Result type for RTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::{
        Error, Result, RtpCsrc, RtpHeader, RtpPacket, RtpSequenceNumber,
        RtpSession, RtpSessionConfig, RtpSsrc, RtpTimestamp,
    };

    pub use crate::packet::rtcp::{
        NtpTimestamp, RtcpPacket, RtcpReceiverReport, RtcpReportBlock,
        RtcpSenderReport,
    };
}
