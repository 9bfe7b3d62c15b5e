//! L16 linear PCM: host-order s16le to network-order s16be and back

use bytes::{Bytes, BytesMut};

use super::{pcm_samples, AudioCodec};
use crate::error::Error;
use crate::Result;

/// Uncompressed 16-bit PCM in network byte order
#[derive(Debug)]
pub struct L16Codec {
    clock_rate: u32,
    channels: u8,
}

impl L16Codec {
    /// Create an L16 codec at the given rate and channel count
    pub fn new(clock_rate: u32, channels: u8) -> Self {
        Self { clock_rate, channels }
    }
}

impl AudioCodec for L16Codec {
    fn name(&self) -> &'static str {
        "L16"
    }

    fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    fn channels(&self) -> u8 {
        self.channels
    }

    fn samples_per_frame(&self) -> usize {
        self.clock_rate as usize / 50
    }

    fn encode(&self, pcm: &[u8]) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(pcm.len());
        for sample in pcm_samples(pcm)? {
            out.extend_from_slice(&sample.to_be_bytes());
        }
        Ok(out.freeze())
    }

    fn decode(&self, payload: &[u8]) -> Result<Bytes> {
        if payload.len() % 2 != 0 {
            return Err(Error::BadFrameSize(payload.len()));
        }
        let mut out = BytesMut::with_capacity(payload.len());
        for chunk in payload.chunks_exact(2) {
            let sample = i16::from_be_bytes([chunk[0], chunk[1]]);
            out.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(out.freeze())
    }
}
