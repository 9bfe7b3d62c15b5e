use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};

/// RTCP Goodbye (BYE) packet
/// Defined in RFC 3550 Section 6.6
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RtcpGoodbye {
    /// Sources leaving the session
    pub sources: Vec<RtpSsrc>,

    /// Optional reason for leaving
    pub reason: Option<String>,
}

impl RtcpGoodbye {
    /// Create a BYE for a single source
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self { sources: vec![ssrc], reason: None }
    }

    /// Body size in bytes, excluding the common RTCP header
    pub fn size(&self) -> usize {
        let mut size = self.sources.len() * 4;
        if let Some(reason) = &self.reason {
            // length byte + text, padded to a 32-bit boundary
            size += (1 + reason.len() + 3) & !3;
        }
        size
    }

    /// Serialize the BYE body
    pub fn serialize(&self, buf: &mut BytesMut) -> Result<()> {
        for source in &self.sources {
            buf.put_u32(*source);
        }
        if let Some(reason) = &self.reason {
            if reason.len() > 255 {
                return Err(Error::InvalidParameter(format!(
                    "BYE reason length {} exceeds 255",
                    reason.len()
                )));
            }
            buf.put_u8(reason.len() as u8);
            buf.put_slice(reason.as_bytes());
            let pad = (4 - (1 + reason.len()) % 4) % 4;
            for _ in 0..pad {
                buf.put_u8(0);
            }
        }
        Ok(())
    }
}

/// Parse a BYE body holding `source_count` sources
pub fn parse_bye(buf: &mut impl Buf, source_count: u8) -> Result<RtcpGoodbye> {
    if buf.remaining() < source_count as usize * 4 {
        return Err(Error::BadLength);
    }

    let mut sources = Vec::with_capacity(source_count as usize);
    for _ in 0..source_count {
        sources.push(buf.get_u32());
    }

    let reason = if buf.remaining() > 0 {
        let length = buf.get_u8() as usize;
        if buf.remaining() < length {
            return Err(Error::BadLength);
        }
        let text = buf.copy_to_bytes(length);
        Some(String::from_utf8_lossy(&text).into_owned())
    } else {
        None
    };

    Ok(RtcpGoodbye { sources, reason })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let bye = RtcpGoodbye::new(0x51b3_0c66);
        let mut buf = BytesMut::new();
        bye.serialize(&mut buf).unwrap();
        assert_eq!(buf.len(), 4);
        assert_eq!(parse_bye(&mut buf.freeze(), 1).unwrap(), bye);
    }

    #[test]
    fn test_no_sources() {
        let bye = RtcpGoodbye::default();
        let mut buf = BytesMut::new();
        bye.serialize(&mut buf).unwrap();
        assert!(buf.is_empty());
        assert_eq!(parse_bye(&mut buf.freeze(), 0).unwrap(), bye);
    }

    #[test]
    fn test_reason_roundtrip() {
        let bye = RtcpGoodbye {
            sources: vec![1, 2],
            reason: Some("teardown".to_string()),
        };
        let mut buf = BytesMut::new();
        bye.serialize(&mut buf).unwrap();
        assert_eq!(buf.len(), bye.size());
        assert_eq!(buf.len() % 4, 0);

        let parsed = parse_bye(&mut buf.freeze(), 2).unwrap();
        assert_eq!(parsed, bye);
    }

    #[test]
    fn test_truncated_sources() {
        let mut buf = bytes::Bytes::from_static(&[0u8; 6]);
        assert_eq!(parse_bye(&mut buf, 2).unwrap_err(), Error::BadLength);
    }

    #[test]
    fn test_truncated_reason() {
        let mut data = BytesMut::new();
        data.put_u32(1);
        data.put_u8(12); // reason length beyond the buffer
        data.put_slice(b"abc");
        assert_eq!(parse_bye(&mut data.freeze(), 1).unwrap_err(), Error::BadLength);
    }
}
