//! RTP Packet module
//!
//! This module provides structures for handling RTP packets as defined in
//! RFC 3550 §5.1: header parsing and serialization, CSRC lists, the
//! profile-specific header extension, payload padding, and the RTP/RTCP
//! demultiplexing rule.

pub mod rtcp;

use bitvec::prelude::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::error::Error;
use crate::{Result, RtpCsrc, RtpSequenceNumber, RtpSsrc, RtpTimestamp};

/// RTP protocol version (always 2 in practice)
pub const RTP_VERSION: u8 = 2;

/// Padding flag position in the first byte
pub const RTP_PADDING_FLAG: usize = 2;

/// Extension flag position in the first byte
pub const RTP_EXTENSION_FLAG: usize = 3;

/// Marker bit position in the second byte
pub const RTP_MARKER_FLAG: usize = 0;

/// Minimum header size (without CSRC or extensions)
pub const RTP_MIN_HEADER_SIZE: usize = 12;

/// Datagrams whose second byte carries a packet type in this range are RTCP.
///
/// RFC 5761 reserves 64..95 of the RTP payload-type space so that the RTCP
/// types 192..223 never collide with RTP payloads on a shared port.
const RTCP_PT_RANGE: std::ops::RangeInclusive<u8> = 192..=223;

/// Returns true if a datagram should be routed to the RTCP parser.
pub fn is_rtcp(data: &[u8]) -> bool {
    data.len() >= 2 && RTCP_PT_RANGE.contains(&data[1])
}

/// Signed distance from `b` to `a` on the 16-bit sequence circle.
///
/// Valid while the in-flight window stays below 32768 packets.
pub fn seq_delta(a: RtpSequenceNumber, b: RtpSequenceNumber) -> i16 {
    a.wrapping_sub(b) as i16
}

/// Returns true if sequence number `a` is ahead of `b`, wrap-aware.
pub fn seq_gt(a: RtpSequenceNumber, b: RtpSequenceNumber) -> bool {
    seq_delta(a, b) > 0
}

/// Format a byte slice as space-separated hex for debug logging
pub fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// The fixed RTP header of RFC 3550 §5.1 plus the CSRC list and the one
/// profile-specific extension slot.
///
/// Padding is not part of the header: the trailing byte count lives on
/// [`RtpPacket`] as `padding_size`, and only the `padding` flag is here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    /// Wire version, always 2 for anything this crate emits
    pub version: u8,

    /// True when padding octets follow the payload
    pub padding: bool,

    /// True when a profile extension follows the CSRC list; implies the
    /// `extension_profile`/`extension_data` pair is populated
    pub extension: bool,

    /// Entry count of `csrc`, 0 to 15
    pub cc: u8,

    /// Profile-defined marker, e.g. the first packet of a talkspurt
    pub marker: bool,

    /// 7-bit payload type naming the codec carried
    pub payload_type: u8,

    /// Per-packet counter, wraps modulo 2^16
    pub sequence_number: RtpSequenceNumber,

    /// Sampling instant of the first payload octet, in clock-rate units
    pub timestamp: RtpTimestamp,

    /// Identity of the stream's synchronization source
    pub ssrc: RtpSsrc,

    /// Sources a mixer folded into this packet, oldest first
    pub csrc: Vec<RtpCsrc>,

    /// Profile value from the extension prefix word
    pub extension_profile: Option<u16>,

    /// Opaque extension value; its length is a multiple of 4 bytes
    pub extension_data: Option<Bytes>,
}

impl Default for RtpHeader {
    fn default() -> Self {
        Self {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            cc: 0,
            marker: false,
            payload_type: 0,
            sequence_number: 0,
            timestamp: 0,
            ssrc: 0,
            csrc: Vec::new(),
            extension_profile: None,
            extension_data: None,
        }
    }
}

impl RtpHeader {
    /// Create a new RTP header with default values
    pub fn new(payload_type: u8, sequence_number: RtpSequenceNumber,
               timestamp: RtpTimestamp, ssrc: RtpSsrc) -> Self {
        Self {
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            ..Default::default()
        }
    }

    /// Get the size of the header in bytes
    pub fn size(&self) -> usize {
        let mut size = RTP_MIN_HEADER_SIZE;
        size += self.csrc.len() * 4;
        if self.extension {
            size += 4 + self.extension_data.as_ref().map_or(0, |d| d.len());
        }
        size
    }

    /// Parse an RTP header from bytes
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < RTP_MIN_HEADER_SIZE {
            return Err(Error::TooShort {
                required: RTP_MIN_HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        // First byte: version (2 bits), padding (1 bit), extension (1 bit), CSRC count (4 bits)
        let first_byte = buf.get_u8();
        let bits = first_byte.view_bits::<Msb0>();

        let version = first_byte >> 6;
        if version != RTP_VERSION {
            return Err(Error::BadVersion(version));
        }

        let padding = bits[RTP_PADDING_FLAG];
        let extension = bits[RTP_EXTENSION_FLAG];
        let cc = first_byte & 0x0f;

        // Second byte: marker (1 bit), payload type (7 bits)
        let second_byte = buf.get_u8();
        let bits = second_byte.view_bits::<Msb0>();

        let marker = bits[RTP_MARKER_FLAG];
        let payload_type = second_byte & 0x7f;

        let sequence_number = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        // CSRC list
        let mut csrc = Vec::with_capacity(cc as usize);
        for _ in 0..cc {
            if buf.remaining() < 4 {
                return Err(Error::TooShort {
                    required: 4,
                    available: buf.remaining(),
                });
            }
            csrc.push(buf.get_u32());
        }

        // Extension header: profile (16 bits), length in 32-bit words (16 bits)
        let (extension_profile, extension_data) = if extension {
            if buf.remaining() < 4 {
                return Err(Error::ExtensionOverrun);
            }
            let profile = buf.get_u16();
            let ext_length = buf.get_u16() as usize * 4;
            if buf.remaining() < ext_length {
                return Err(Error::ExtensionOverrun);
            }
            (Some(profile), Some(buf.copy_to_bytes(ext_length)))
        } else {
            (None, None)
        };

        Ok(Self {
            version,
            padding,
            extension,
            cc,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension_profile,
            extension_data,
        })
    }

    /// Serialize the header to bytes
    pub fn serialize(&self, buf: &mut BytesMut) -> Result<()> {
        buf.reserve(self.size());

        let mut first_byte = (self.version & 0x03) << 6;
        if self.padding {
            first_byte |= 1 << 5;
        }
        if self.extension {
            first_byte |= 1 << 4;
        }
        first_byte |= self.cc & 0x0f;
        buf.put_u8(first_byte);

        let mut second_byte = self.payload_type & 0x7f;
        if self.marker {
            second_byte |= 1 << 7;
        }
        buf.put_u8(second_byte);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);

        if self.cc as usize != self.csrc.len() || self.csrc.len() > 15 {
            return Err(Error::InvalidParameter(format!(
                "CSRC count ({}) does not match CSRC list length ({})",
                self.cc, self.csrc.len()
            )));
        }
        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }

        if self.extension {
            let (profile, data) = match (self.extension_profile, &self.extension_data) {
                (Some(profile), Some(data)) => (profile, data),
                _ => {
                    return Err(Error::InvalidParameter(
                        "extension flag is set but extension data is missing".to_string(),
                    ))
                }
            };
            if data.len() % 4 != 0 {
                return Err(Error::InvalidParameter(format!(
                    "extension data length ({}) is not a multiple of 4",
                    data.len()
                )));
            }
            buf.put_u16(profile);
            buf.put_u16((data.len() / 4) as u16);
            buf.put_slice(data);
        }

        Ok(())
    }
}

/// RTP packet implementation
///
/// `payload` never includes padding; a non-zero `padding_size` records the
/// trailing byte count (including the length byte itself) and is re-emitted
/// verbatim on serialize, so parse/serialize round-trips are byte-exact.
#[derive(Clone, PartialEq, Eq)]
pub struct RtpPacket {
    /// RTP header
    pub header: RtpHeader,

    /// Payload data, padding excluded
    pub payload: Bytes,

    /// Trailing padding byte count, 0 when the padding flag is clear
    pub padding_size: u8,
}

impl RtpPacket {
    /// Create a new RTP packet
    pub fn new(header: RtpHeader, payload: Bytes) -> Self {
        Self { header, payload, padding_size: 0 }
    }

    /// Create a new RTP packet with basic parameters
    pub fn new_with_payload(
        payload_type: u8,
        sequence_number: RtpSequenceNumber,
        timestamp: RtpTimestamp,
        ssrc: RtpSsrc,
        payload: Bytes,
    ) -> Self {
        let header = RtpHeader::new(payload_type, sequence_number, timestamp, ssrc);
        Self { header, payload, padding_size: 0 }
    }

    /// Get the total size of the packet in bytes
    pub fn size(&self) -> usize {
        self.header.size() + self.payload.len() + self.padding_size as usize
    }

    /// Parse an RTP packet from bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(data);

        let header = RtpHeader::parse(&mut buf)?;

        let padding_size = if header.padding {
            let size = *buf.as_ref().last().ok_or(Error::InconsistentPadding)? as usize;
            if size == 0 || size > buf.len() {
                return Err(Error::InconsistentPadding);
            }
            size
        } else {
            0
        };

        let payload = buf.slice(0..buf.len() - padding_size);

        Ok(Self { header, payload, padding_size: padding_size as u8 })
    }

    /// Serialize the packet to bytes
    pub fn serialize(&self) -> Result<Bytes> {
        if self.header.padding != (self.padding_size > 0) {
            return Err(Error::InconsistentPadding);
        }

        let mut buf = BytesMut::with_capacity(self.size());
        self.header.serialize(&mut buf)?;
        buf.put_slice(&self.payload);

        if self.padding_size > 0 {
            for _ in 0..self.padding_size - 1 {
                buf.put_u8(0);
            }
            buf.put_u8(self.padding_size);
        }

        Ok(buf.freeze())
    }
}

impl fmt::Debug for RtpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RtpPacket(seq={}, ts={}, marker={}, payload={}, {} bytes)",
            self.header.sequence_number,
            self.header.timestamp,
            self.header.marker as u8,
            self.header.payload_type,
            self.payload.len()
        )
    }
}
