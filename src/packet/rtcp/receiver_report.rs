use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};
use super::report_block::RtcpReportBlock;

/// RTCP Receiver Report (RR) packet
/// Defined in RFC 3550 Section 6.4.2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpReceiverReport {
    /// SSRC of the reporter
    pub ssrc: RtpSsrc,

    /// Report blocks
    pub report_blocks: Vec<RtcpReportBlock>,
}

impl RtcpReceiverReport {
    /// Create a new receiver report with no blocks
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self { ssrc, report_blocks: Vec::new() }
    }

    /// Body size in bytes, excluding the common RTCP header
    pub fn size(&self) -> usize {
        4 + self.report_blocks.len() * RtcpReportBlock::SIZE
    }

    /// Serialize the receiver report body
    pub fn serialize(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32(self.ssrc);
        for block in &self.report_blocks {
            block.serialize(buf)?;
        }
        Ok(())
    }
}

/// Parse a receiver report body
pub fn parse_receiver_report(buf: &mut impl Buf, report_count: u8) -> Result<RtcpReceiverReport> {
    let expected = 4 + report_count as usize * RtcpReportBlock::SIZE;
    if buf.remaining() != expected {
        return Err(Error::BadLength);
    }

    let ssrc = buf.get_u32();
    let mut report_blocks = Vec::with_capacity(report_count as usize);
    for _ in 0..report_count {
        report_blocks.push(RtcpReportBlock::parse(buf)?);
    }

    Ok(RtcpReceiverReport { ssrc, report_blocks })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut rr = RtcpReceiverReport::new(0x44aa_17f3);
        rr.report_blocks.push(RtcpReportBlock {
            ssrc: 0x0beb_5198,
            jitter: 211,
            highest_sequence: 9871,
            ..Default::default()
        });

        let mut buf = BytesMut::new();
        rr.serialize(&mut buf).unwrap();
        assert_eq!(buf.len(), rr.size());

        let parsed = parse_receiver_report(&mut buf.freeze(), 1).unwrap();
        assert_eq!(parsed, rr);
    }

    #[test]
    fn test_empty_report() {
        let rr = RtcpReceiverReport::new(42);
        let mut buf = BytesMut::new();
        rr.serialize(&mut buf).unwrap();
        assert_eq!(buf.len(), 4);
        assert_eq!(parse_receiver_report(&mut buf.freeze(), 0).unwrap(), rr);
    }

    #[test]
    fn test_bad_length() {
        let mut buf = bytes::Bytes::from_static(&[0u8; 8]);
        assert_eq!(
            parse_receiver_report(&mut buf, 0).unwrap_err(),
            Error::BadLength
        );
    }
}
