use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};

/// SDES item types defined in RFC 3550 Section 6.5
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RtcpSdesItemType {
    /// Canonical endpoint identifier
    Cname = 1,
    /// User name
    Name = 2,
    /// Electronic mail address
    Email = 3,
    /// Phone number
    Phone = 4,
    /// Geographic location
    Location = 5,
    /// Application or tool name
    Tool = 6,
    /// Notice / status
    Note = 7,
}

/// One SDES item: a typed text value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpSdesItem {
    /// Item type code
    pub item_type: u8,

    /// Item text
    pub value: String,
}

impl RtcpSdesItem {
    /// Create a CNAME item
    pub fn cname(value: String) -> Self {
        Self { item_type: RtcpSdesItemType::Cname as u8, value }
    }
}

/// One SDES chunk: an SSRC and its items
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpSdesChunk {
    /// Source the items describe
    pub ssrc: RtpSsrc,

    /// Items, in wire order
    pub items: Vec<RtcpSdesItem>,
}

impl RtcpSdesChunk {
    /// Create a chunk with no items
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self { ssrc, items: Vec::new() }
    }

    /// Add an item
    pub fn add_item(&mut self, item: RtcpSdesItem) {
        self.items.push(item);
    }

    fn size(&self) -> usize {
        let items: usize = self.items.iter().map(|i| 2 + i.value.len()).sum();
        // ssrc + items + null terminator, padded to a 32-bit boundary
        let unpadded = 4 + items + 1;
        (unpadded + 3) & !3
    }
}

/// RTCP Source Description (SDES) packet
/// Defined in RFC 3550 Section 6.5
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RtcpSourceDescription {
    /// Chunks, one per described source
    pub chunks: Vec<RtcpSdesChunk>,
}

impl RtcpSourceDescription {
    /// Create an empty SDES packet
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an SDES carrying a single CNAME chunk
    pub fn cname(ssrc: RtpSsrc, cname: String) -> Self {
        let mut chunk = RtcpSdesChunk::new(ssrc);
        chunk.add_item(RtcpSdesItem::cname(cname));
        Self { chunks: vec![chunk] }
    }

    /// Add a chunk
    pub fn add_chunk(&mut self, chunk: RtcpSdesChunk) {
        self.chunks.push(chunk);
    }

    /// Body size in bytes, excluding the common RTCP header
    pub fn size(&self) -> usize {
        self.chunks.iter().map(|c| c.size()).sum()
    }

    /// Serialize the SDES body
    pub fn serialize(&self, buf: &mut BytesMut) -> Result<()> {
        for chunk in &self.chunks {
            buf.put_u32(chunk.ssrc);
            for item in &chunk.items {
                if item.value.len() > 255 {
                    return Err(Error::InvalidParameter(format!(
                        "SDES item length {} exceeds 255",
                        item.value.len()
                    )));
                }
                buf.put_u8(item.item_type);
                buf.put_u8(item.value.len() as u8);
                buf.put_slice(item.value.as_bytes());
            }
            // null terminator plus padding to the next 32-bit boundary
            let written: usize = 4 + chunk.items.iter().map(|i| 2 + i.value.len()).sum::<usize>();
            for _ in 0..chunk.size() - written {
                buf.put_u8(0);
            }
        }
        Ok(())
    }
}

/// Parse an SDES body holding `source_count` chunks
pub fn parse_sdes(buf: &mut impl Buf, source_count: u8) -> Result<RtcpSourceDescription> {
    let mut chunks = Vec::with_capacity(source_count as usize);

    for _ in 0..source_count {
        if buf.remaining() < 4 {
            return Err(Error::BadLength);
        }
        let mut chunk = RtcpSdesChunk::new(buf.get_u32());
        let mut consumed = 4usize;

        loop {
            if buf.remaining() < 1 {
                return Err(Error::BadLength);
            }
            let item_type = buf.get_u8();
            consumed += 1;
            if item_type == 0 {
                break;
            }
            if buf.remaining() < 1 {
                return Err(Error::BadLength);
            }
            let length = buf.get_u8() as usize;
            consumed += 1;
            if buf.remaining() < length {
                return Err(Error::BadLength);
            }
            let value = buf.copy_to_bytes(length);
            consumed += length;
            chunk.add_item(RtcpSdesItem {
                item_type,
                value: String::from_utf8_lossy(&value).into_owned(),
            });
        }

        // skip the chunk's padding to the next 32-bit boundary
        let pad = (4 - consumed % 4) % 4;
        if buf.remaining() < pad {
            return Err(Error::BadLength);
        }
        buf.advance(pad);

        chunks.push(chunk);
    }

    Ok(RtcpSourceDescription { chunks })
}
