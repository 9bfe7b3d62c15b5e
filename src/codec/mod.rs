//! Audio payload codecs and the payload-type registry
//!
//! Codecs transform between host PCM (signed 16-bit little-endian) and the
//! RTP payload wire form. Implementations are stateless and shared behind
//! `Arc`, so one descriptor can serve any number of sessions.
//!
//! The registry maps payload types to codecs. A process-wide default table
//! holds the static assignments (PCMU, PCMA, L16); it is frozen on first
//! use. Sessions take a clone, and tests build their own tables with
//! [`CodecRegistry::empty`] plus [`CodecRegistry::register`] — which is also
//! how an external codec such as Opus plugs in at a dynamic payload type.

mod g711;
mod l16;

pub use g711::{PcmaCodec, PcmuCodec};
pub use l16::L16Codec;

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::error::Error;
use crate::Result;

/// Static payload type for G.711 µ-law
pub const PT_PCMU: u8 = 0;

/// Static payload type for G.711 A-law
pub const PT_PCMA: u8 = 8;

/// Static payload type for L16 mono at 44100 Hz
pub const PT_L16: u8 = 11;

/// An audio payload codec capability
///
/// `encode` takes host PCM (s16le) and yields the RTP payload; `decode` is
/// the inverse. Both are synchronous and run on the session task.
pub trait AudioCodec: Send + Sync + std::fmt::Debug {
    /// Codec name as it would appear in SDP
    fn name(&self) -> &'static str;

    /// RTP clock rate in Hz
    fn clock_rate(&self) -> u32;

    /// Number of interleaved channels
    fn channels(&self) -> u8;

    /// Samples per channel in one nominal 20 ms frame
    fn samples_per_frame(&self) -> usize;

    /// Encode host PCM (s16le) into payload bytes
    fn encode(&self, pcm: &[u8]) -> Result<Bytes>;

    /// Decode payload bytes into host PCM (s16le)
    fn decode(&self, payload: &[u8]) -> Result<Bytes>;
}

/// Mapping from RTP payload type to codec
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<u8, Arc<dyn AudioCodec>>,
}

impl CodecRegistry {
    /// Create a registry with no entries
    pub fn empty() -> Self {
        Self { codecs: HashMap::new() }
    }

    /// Register a codec for a payload type, replacing any previous entry
    pub fn register(&mut self, payload_type: u8, codec: Arc<dyn AudioCodec>) {
        self.codecs.insert(payload_type, codec);
    }

    /// Get the codec for a payload type
    pub fn get(&self, payload_type: u8) -> Option<Arc<dyn AudioCodec>> {
        self.codecs.get(&payload_type).cloned()
    }

    /// Get the codec for a payload type, failing if none is registered
    pub fn lookup(&self, payload_type: u8) -> Result<Arc<dyn AudioCodec>> {
        self.get(payload_type)
            .ok_or(Error::UnknownPayloadType(payload_type))
    }

    /// Payload types currently registered
    pub fn payload_types(&self) -> Vec<u8> {
        let mut types: Vec<u8> = self.codecs.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

impl Default for CodecRegistry {
    /// The static audio assignments of the RTP A/V profile
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(PT_PCMU, Arc::new(PcmuCodec));
        registry.register(PT_PCMA, Arc::new(PcmaCodec));
        registry.register(PT_L16, Arc::new(L16Codec::new(44_100, 1)));
        registry
    }
}

/// The process-wide default registry, frozen at first use
pub fn default_registry() -> &'static CodecRegistry {
    static REGISTRY: OnceLock<CodecRegistry> = OnceLock::new();
    REGISTRY.get_or_init(CodecRegistry::default)
}

/// Reinterpret an s16le byte buffer as samples
pub(crate) fn pcm_samples(pcm: &[u8]) -> Result<impl Iterator<Item = i16> + '_> {
    if pcm.len() % 2 != 0 {
        return Err(Error::BadFrameSize(pcm.len()));
    }
    Ok(pcm.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])))
}
