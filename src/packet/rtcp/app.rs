use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};

/// RTCP Application-Defined (APP) packet
/// Defined in RFC 3550 Section 6.7
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpApplicationDefined {
    /// Subtype, application-defined (the count field of the header)
    pub subtype: u8,

    /// SSRC of the sender
    pub ssrc: RtpSsrc,

    /// Four-character ASCII name
    pub name: [u8; 4],

    /// Application data, length a multiple of 4 bytes
    pub data: Bytes,
}

impl RtcpApplicationDefined {
    /// Create an APP packet with no data
    pub fn new(ssrc: RtpSsrc, name: [u8; 4]) -> Self {
        Self { subtype: 0, ssrc, name, data: Bytes::new() }
    }

    /// Body size in bytes, excluding the common RTCP header
    pub fn size(&self) -> usize {
        8 + self.data.len()
    }

    /// Serialize the APP body
    pub fn serialize(&self, buf: &mut BytesMut) -> Result<()> {
        if self.data.len() % 4 != 0 {
            return Err(Error::InvalidParameter(format!(
                "APP data length ({}) is not a multiple of 4",
                self.data.len()
            )));
        }
        buf.put_u32(self.ssrc);
        buf.put_slice(&self.name);
        buf.put_slice(&self.data);
        Ok(())
    }
}

/// Parse an APP body
pub fn parse_app(buf: &mut impl Buf, subtype: u8) -> Result<RtcpApplicationDefined> {
    if buf.remaining() < 8 {
        return Err(Error::BadLength);
    }

    let ssrc = buf.get_u32();
    let mut name = [0u8; 4];
    buf.copy_to_slice(&mut name);
    let data = buf.copy_to_bytes(buf.remaining());

    Ok(RtcpApplicationDefined { subtype, ssrc, name, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let app = RtcpApplicationDefined {
            subtype: 3,
            ssrc: 0xfeed_f00d,
            name: *b"qosx",
            data: Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]),
        };

        let mut buf = BytesMut::new();
        app.serialize(&mut buf).unwrap();
        assert_eq!(buf.len(), app.size());
        assert_eq!(parse_app(&mut buf.freeze(), 3).unwrap(), app);
    }

    #[test]
    fn test_unaligned_data_rejected() {
        let mut app = RtcpApplicationDefined::new(1, *b"test");
        app.data = Bytes::from_static(&[1, 2, 3]);
        let mut buf = BytesMut::new();
        assert!(matches!(
            app.serialize(&mut buf),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_truncated() {
        let mut buf = bytes::Bytes::from_static(&[0u8; 7]);
        assert_eq!(parse_app(&mut buf, 0).unwrap_err(), Error::BadLength);
    }
}
