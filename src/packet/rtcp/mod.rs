//! RTCP Packet module
//!
//! This module provides structures for handling RTCP packets as defined in
//! RFC 3550: Sender Report, Receiver Report, Source Description, Goodbye and
//! Application-Defined packets, plus compound packet parsing/serialization.
//! A compound datagram carries one or more back-to-back packets; the first is
//! an SR or RR and an SDES with a CNAME item accompanies it.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::Error;
use crate::Result;

/// RTCP version (same as RTP, always 2)
pub const RTCP_VERSION: u8 = 2;

// Import and re-export types from submodules
mod app;
mod bye;
mod ntp;
mod receiver_report;
mod report_block;
mod sdes;
mod sender_report;

pub use app::RtcpApplicationDefined;
pub use bye::RtcpGoodbye;
pub use ntp::NtpTimestamp;
pub use receiver_report::RtcpReceiverReport;
pub use report_block::{clamp_packets_lost, RtcpReportBlock};
pub use sdes::{RtcpSdesChunk, RtcpSdesItem, RtcpSdesItemType, RtcpSourceDescription};
pub use sender_report::RtcpSenderReport;

/// RTCP packet types as defined in RFC 3550
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RtcpPacketType {
    /// Sender Report (SR)
    SenderReport = 200,

    /// Receiver Report (RR)
    ReceiverReport = 201,

    /// Source Description (SDES)
    SourceDescription = 202,

    /// Goodbye (BYE)
    Goodbye = 203,

    /// Application-Defined (APP)
    ApplicationDefined = 204,
}

impl TryFrom<u8> for RtcpPacketType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            200 => Ok(RtcpPacketType::SenderReport),
            201 => Ok(RtcpPacketType::ReceiverReport),
            202 => Ok(RtcpPacketType::SourceDescription),
            203 => Ok(RtcpPacketType::Goodbye),
            204 => Ok(RtcpPacketType::ApplicationDefined),
            _ => Err(Error::InvalidParameter(format!(
                "unknown RTCP packet type: {}",
                value
            ))),
        }
    }
}

/// RTCP packet variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpPacket {
    /// Sender Report (SR)
    SenderReport(RtcpSenderReport),

    /// Receiver Report (RR)
    ReceiverReport(RtcpReceiverReport),

    /// Source Description (SDES)
    SourceDescription(RtcpSourceDescription),

    /// Goodbye (BYE)
    Goodbye(RtcpGoodbye),

    /// Application-Defined (APP)
    ApplicationDefined(RtcpApplicationDefined),
}

impl RtcpPacket {
    /// The wire packet type of this variant
    pub fn packet_type(&self) -> RtcpPacketType {
        match self {
            RtcpPacket::SenderReport(_) => RtcpPacketType::SenderReport,
            RtcpPacket::ReceiverReport(_) => RtcpPacketType::ReceiverReport,
            RtcpPacket::SourceDescription(_) => RtcpPacketType::SourceDescription,
            RtcpPacket::Goodbye(_) => RtcpPacketType::Goodbye,
            RtcpPacket::ApplicationDefined(_) => RtcpPacketType::ApplicationDefined,
        }
    }

    /// Value of the 5-bit count field for this variant
    fn count(&self) -> usize {
        match self {
            RtcpPacket::SenderReport(sr) => sr.report_blocks.len(),
            RtcpPacket::ReceiverReport(rr) => rr.report_blocks.len(),
            RtcpPacket::SourceDescription(sdes) => sdes.chunks.len(),
            RtcpPacket::Goodbye(bye) => bye.sources.len(),
            RtcpPacket::ApplicationDefined(app) => app.subtype as usize,
        }
    }

    /// Parse all packets of a compound RTCP datagram, in wire order.
    ///
    /// Each sub-packet's length field is authoritative; a field that runs
    /// past the buffer fails with `BadLength`. Packet types outside the
    /// SR/RR/SDES/BYE/APP set are skipped by their declared length.
    pub fn parse_compound(data: &[u8]) -> Result<Vec<RtcpPacket>> {
        let mut buf = Bytes::copy_from_slice(data);
        let mut packets = Vec::new();

        while buf.has_remaining() {
            if buf.remaining() < 4 {
                return Err(Error::TooShort {
                    required: 4,
                    available: buf.remaining(),
                });
            }

            let first_byte = buf.get_u8();
            let version = first_byte >> 6;
            if version != RTCP_VERSION {
                return Err(Error::BadVersion(version));
            }
            let padding = first_byte & 0x20 != 0;
            let count = first_byte & 0x1f;

            let packet_type = buf.get_u8();
            let body_len = buf.get_u16() as usize * 4;
            if buf.remaining() < body_len {
                return Err(Error::BadLength);
            }
            let mut body = buf.copy_to_bytes(body_len);

            // strip per-packet padding before handing the body over
            if padding {
                let pad = *body.as_ref().last().ok_or(Error::InconsistentPadding)? as usize;
                if pad == 0 || pad > body.len() {
                    return Err(Error::InconsistentPadding);
                }
                body = body.slice(0..body.len() - pad);
            }

            match packet_type {
                200 => packets.push(RtcpPacket::SenderReport(
                    sender_report::parse_sender_report(&mut body, count)?,
                )),
                201 => packets.push(RtcpPacket::ReceiverReport(
                    receiver_report::parse_receiver_report(&mut body, count)?,
                )),
                202 => packets.push(RtcpPacket::SourceDescription(
                    sdes::parse_sdes(&mut body, count)?,
                )),
                203 => packets.push(RtcpPacket::Goodbye(
                    bye::parse_bye(&mut body, count)?,
                )),
                204 => packets.push(RtcpPacket::ApplicationDefined(
                    app::parse_app(&mut body, count)?,
                )),
                other => {
                    trace!("skipping RTCP packet type {} ({} bytes)", other, body_len);
                }
            }
        }

        Ok(packets)
    }

    /// Serialize one RTCP packet, common header included
    pub fn serialize(&self) -> Result<Bytes> {
        let count = self.count();
        if count > 31 {
            return Err(Error::InvalidParameter(format!(
                "RTCP count field {} exceeds 31",
                count
            )));
        }

        let mut body = BytesMut::new();
        match self {
            RtcpPacket::SenderReport(sr) => sr.serialize(&mut body)?,
            RtcpPacket::ReceiverReport(rr) => rr.serialize(&mut body)?,
            RtcpPacket::SourceDescription(sdes) => sdes.serialize(&mut body)?,
            RtcpPacket::Goodbye(bye) => bye.serialize(&mut body)?,
            RtcpPacket::ApplicationDefined(app) => app.serialize(&mut body)?,
        }
        debug_assert_eq!(body.len() % 4, 0);

        let mut buf = BytesMut::with_capacity(4 + body.len());
        buf.put_u8((RTCP_VERSION << 6) | count as u8);
        buf.put_u8(self.packet_type() as u8);
        buf.put_u16((body.len() / 4) as u16);
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    /// Serialize a compound packet: the given packets back to back
    pub fn serialize_compound(packets: &[RtcpPacket]) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        for packet in packets {
            buf.put_slice(&packet.serialize()?);
        }
        Ok(buf.freeze())
    }
}
