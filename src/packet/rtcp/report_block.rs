use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};

/// Bounds of the 24-bit two's-complement cumulative-loss field
const PACKETS_LOST_MIN: i32 = -(1 << 23);
const PACKETS_LOST_MAX: i32 = (1 << 23) - 1;

/// Clamp a loss count into the 24-bit signed range of the report block
pub fn clamp_packets_lost(count: i64) -> i32 {
    count.clamp(PACKETS_LOST_MIN as i64, PACKETS_LOST_MAX as i64) as i32
}

/// Reception report block, carried in both SR and RR packets
/// Defined in RFC 3550 Section 6.4.1
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RtcpReportBlock {
    /// SSRC of the source this block reports on
    pub ssrc: RtpSsrc,

    /// Fraction of packets lost since the previous report, in 1/256 units
    pub fraction_lost: u8,

    /// Cumulative number of packets lost, 24-bit signed
    pub cumulative_lost: i32,

    /// Extended highest sequence number: cycle count in the top 16 bits
    pub highest_sequence: u32,

    /// Interarrival jitter in timestamp units (RFC 3550 A.8)
    pub jitter: u32,

    /// Middle 32 bits of the last received SR's NTP timestamp, 0 if none
    pub last_sr: u32,

    /// Delay since that SR in 1/65536 second units
    pub delay_since_last_sr: u32,
}

impl RtcpReportBlock {
    /// Wire size of one report block
    pub const SIZE: usize = 24;

    /// Parse a report block
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < Self::SIZE {
            return Err(Error::TooShort {
                required: Self::SIZE,
                available: buf.remaining(),
            });
        }

        let ssrc = buf.get_u32();
        let fraction_lost = buf.get_u8();

        // 24-bit two's-complement cumulative loss
        let raw = ((buf.get_u8() as u32) << 16)
            | ((buf.get_u8() as u32) << 8)
            | buf.get_u8() as u32;
        let cumulative_lost = if raw & 0x80_0000 != 0 {
            (raw | 0xff00_0000) as i32
        } else {
            raw as i32
        };

        Ok(Self {
            ssrc,
            fraction_lost,
            cumulative_lost,
            highest_sequence: buf.get_u32(),
            jitter: buf.get_u32(),
            last_sr: buf.get_u32(),
            delay_since_last_sr: buf.get_u32(),
        })
    }

    /// Serialize the report block
    pub fn serialize(&self, buf: &mut BytesMut) -> Result<()> {
        if !(PACKETS_LOST_MIN..=PACKETS_LOST_MAX).contains(&self.cumulative_lost) {
            return Err(Error::InvalidParameter(format!(
                "cumulative loss {} exceeds 24-bit range",
                self.cumulative_lost
            )));
        }

        buf.put_u32(self.ssrc);
        buf.put_u8(self.fraction_lost);

        let raw = (self.cumulative_lost as u32) & 0x00ff_ffff;
        buf.put_u8((raw >> 16) as u8);
        buf.put_u8((raw >> 8) as u8);
        buf.put_u8(raw as u8);

        buf.put_u32(self.highest_sequence);
        buf.put_u32(self.jitter);
        buf.put_u32(self.last_sr);
        buf.put_u32(self.delay_since_last_sr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_packets_lost() {
        assert_eq!(clamp_packets_lost(-8_388_609), -8_388_608);
        assert_eq!(clamp_packets_lost(-8_388_608), -8_388_608);
        assert_eq!(clamp_packets_lost(0), 0);
        assert_eq!(clamp_packets_lost(8_388_607), 8_388_607);
        assert_eq!(clamp_packets_lost(8_388_608), 8_388_607);
    }

    #[test]
    fn test_packets_lost_wire_form() {
        for (value, wire) in [
            (-8_388_608i32, [0x80u8, 0x00, 0x00]),
            (-1, [0xff, 0xff, 0xff]),
            (0, [0x00, 0x00, 0x00]),
            (1, [0x00, 0x00, 0x01]),
            (8_388_607, [0x7f, 0xff, 0xff]),
        ] {
            let block = RtcpReportBlock { cumulative_lost: value, ..Default::default() };
            let mut buf = BytesMut::new();
            block.serialize(&mut buf).unwrap();
            assert_eq!(&buf[5..8], &wire);

            let parsed = RtcpReportBlock::parse(&mut buf.freeze()).unwrap();
            assert_eq!(parsed.cumulative_lost, value);
        }
    }

    #[test]
    fn test_roundtrip() {
        let block = RtcpReportBlock {
            ssrc: 0x7a44_9e02,
            fraction_lost: 63,
            cumulative_lost: -2,
            highest_sequence: 0x0001_0002,
            jitter: 211,
            last_sr: 0x0a83_21f0,
            delay_since_last_sr: 65_536,
        };
        let mut buf = BytesMut::new();
        block.serialize(&mut buf).unwrap();
        assert_eq!(buf.len(), RtcpReportBlock::SIZE);
        assert_eq!(RtcpReportBlock::parse(&mut buf.freeze()).unwrap(), block);
    }

    #[test]
    fn test_truncated() {
        let mut buf = bytes::Bytes::from_static(&[0u8; 23]);
        assert!(matches!(
            RtcpReportBlock::parse(&mut buf),
            Err(Error::TooShort { .. })
        ));
    }
}
