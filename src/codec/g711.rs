//! G.711 µ-law (PCMU) and A-law (PCMA) companding
//!
//! Both variants carry 8 kHz narrowband voice as one byte per sample, 160
//! samples per 20 ms frame. Decoding goes through 256-entry tables built at
//! compile time; encoding walks the same piecewise-linear segments the
//! tables are derived from.

use bytes::{Bytes, BytesMut};

use super::{pcm_samples, AudioCodec};
use crate::Result;

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32_635;

const fn build_ulaw_decode_table() -> [i16; 256] {
    let mut table = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        let ulaw = !(i as u8);
        let exponent = (ulaw >> 4) & 0x07;
        let mantissa = ulaw & 0x0f;
        let mut sample = (((mantissa as i32) << 3) + ULAW_BIAS) << exponent;
        sample -= ULAW_BIAS;
        if ulaw & 0x80 != 0 {
            sample = -sample;
        }
        table[i] = sample as i16;
        i += 1;
    }
    table
}

const ULAW_DECODE_TABLE: [i16; 256] = build_ulaw_decode_table();

fn encode_ulaw_sample(sample: i16) -> u8 {
    let mut value = sample as i32;
    let sign = if value < 0 {
        value = -value;
        0x80u8
    } else {
        0
    };
    if value > ULAW_CLIP {
        value = ULAW_CLIP;
    }
    value += ULAW_BIAS;

    let mut exponent = 7u8;
    let mut mask = 0x4000;
    while exponent > 0 && value & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = ((value >> (exponent + 3)) & 0x0f) as u8;

    !(sign | (exponent << 4) | mantissa)
}

const fn build_alaw_decode_table() -> [i16; 256] {
    let mut table = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        let alaw = (i as u8) ^ 0x55;
        let exponent = (alaw >> 4) & 0x07;
        let mantissa = (alaw & 0x0f) as i32;
        let mut sample = if exponent == 0 {
            (mantissa << 4) + 8
        } else {
            ((mantissa << 4) + 0x108) << (exponent - 1)
        };
        if alaw & 0x80 != 0 {
            sample = -sample;
        }
        table[i] = sample as i16;
        i += 1;
    }
    table
}

const ALAW_DECODE_TABLE: [i16; 256] = build_alaw_decode_table();

fn encode_alaw_sample(sample: i16) -> u8 {
    let mut value = sample as i32;
    let sign = if value < 0 {
        value = -value;
        0x80u8
    } else {
        0
    };
    if value > 32_767 {
        value = 32_767;
    }

    let compressed = if value >= 256 {
        let mut exponent = 7u8;
        let mut mask = 0x4000;
        while exponent > 1 && value & mask == 0 {
            exponent -= 1;
            mask >>= 1;
        }
        let mantissa = ((value >> (exponent + 3)) & 0x0f) as u8;
        sign | (exponent << 4) | mantissa
    } else {
        sign | ((value >> 4) as u8)
    };

    compressed ^ 0x55
}

/// G.711 µ-law codec, static payload type 0
#[derive(Debug)]
pub struct PcmuCodec;

impl AudioCodec for PcmuCodec {
    fn name(&self) -> &'static str {
        "PCMU"
    }

    fn clock_rate(&self) -> u32 {
        8000
    }

    fn channels(&self) -> u8 {
        1
    }

    fn samples_per_frame(&self) -> usize {
        160
    }

    fn encode(&self, pcm: &[u8]) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(pcm.len() / 2);
        for sample in pcm_samples(pcm)? {
            out.extend_from_slice(&[encode_ulaw_sample(sample)]);
        }
        Ok(out.freeze())
    }

    fn decode(&self, payload: &[u8]) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(payload.len() * 2);
        for &byte in payload {
            out.extend_from_slice(&ULAW_DECODE_TABLE[byte as usize].to_le_bytes());
        }
        Ok(out.freeze())
    }
}

/// G.711 A-law codec, static payload type 8
#[derive(Debug)]
pub struct PcmaCodec;

impl AudioCodec for PcmaCodec {
    fn name(&self) -> &'static str {
        "PCMA"
    }

    fn clock_rate(&self) -> u32 {
        8000
    }

    fn channels(&self) -> u8 {
        1
    }

    fn samples_per_frame(&self) -> usize {
        160
    }

    fn encode(&self, pcm: &[u8]) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(pcm.len() / 2);
        for sample in pcm_samples(pcm)? {
            out.extend_from_slice(&[encode_alaw_sample(sample)]);
        }
        Ok(out.freeze())
    }

    fn decode(&self, payload: &[u8]) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(payload.len() * 2);
        for &byte in payload {
            out.extend_from_slice(&ALAW_DECODE_TABLE[byte as usize].to_le_bytes());
        }
        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn pcm_from(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn samples_from(pcm: &[u8]) -> Vec<i16> {
        pcm.chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn test_ulaw_silence() {
        let codec = PcmuCodec;
        let pcm = pcm_from(&[0i16; 160]);
        let encoded = codec.encode(&pcm).unwrap();
        assert_eq!(encoded.len(), 160);
        assert!(encoded.iter().all(|&b| b == 0xff));

        let decoded = codec.decode(&encoded).unwrap();
        for sample in samples_from(&decoded) {
            assert!(sample.abs() <= 8, "silence decoded to {}", sample);
        }
    }

    #[test]
    fn test_alaw_silence() {
        let codec = PcmaCodec;
        let pcm = pcm_from(&[0i16; 160]);
        let encoded = codec.encode(&pcm).unwrap();
        assert_eq!(encoded.len(), 160);
        assert!(encoded.iter().all(|&b| b == 0x55));

        let decoded = codec.decode(&encoded).unwrap();
        for sample in samples_from(&decoded) {
            assert!(sample.abs() <= 16, "silence decoded to {}", sample);
        }
    }

    #[test]
    fn test_ulaw_roundtrip_error_bound() {
        let codec = PcmuCodec;
        // sweep the full 16-bit range at a coarse step
        for raw in (-32768i32..=32767).step_by(37) {
            let sample = raw as i16;
            let encoded = codec.encode(&pcm_from(&[sample])).unwrap();
            let decoded = samples_from(&codec.decode(&encoded).unwrap())[0];
            // error grows with the segment step of the companding curve
            let bound = (sample as i32).abs() / 16 + 16;
            assert!(
                ((sample as i32) - (decoded as i32)).abs() <= bound,
                "µ-law {} -> {} exceeds bound {}",
                sample,
                decoded,
                bound
            );
        }
    }

    #[test]
    fn test_alaw_roundtrip_error_bound() {
        let codec = PcmaCodec;
        for raw in (-32768i32..=32767).step_by(37) {
            let sample = raw as i16;
            let encoded = codec.encode(&pcm_from(&[sample])).unwrap();
            let decoded = samples_from(&codec.decode(&encoded).unwrap())[0];
            let bound = (sample as i32).abs() / 16 + 24;
            assert!(
                ((sample as i32) - (decoded as i32)).abs() <= bound,
                "A-law {} -> {} exceeds bound {}",
                sample,
                decoded,
                bound
            );
        }
    }

    #[test]
    fn test_decode_encode_is_identity_on_wire_bytes() {
        // every decode-table output must encode back to the byte it came
        // from; 0x7f is µ-law negative zero, which folds onto 0xff
        for byte in 0u8..=255 {
            if byte == 0x7f {
                continue;
            }
            let sample = ULAW_DECODE_TABLE[byte as usize];
            assert_eq!(encode_ulaw_sample(sample), byte, "µ-law byte {:#04x}", byte);
        }
        for byte in 0u8..=255 {
            let sample = ALAW_DECODE_TABLE[byte as usize];
            assert_eq!(encode_alaw_sample(sample), byte, "A-law byte {:#04x}", byte);
        }
    }

    #[test]
    fn test_extremes_do_not_panic() {
        for codec in [&PcmuCodec as &dyn AudioCodec, &PcmaCodec] {
            let pcm = pcm_from(&[i16::MAX, i16::MIN, 0, -1, 1]);
            let encoded = codec.encode(&pcm).unwrap();
            assert_eq!(encoded.len(), 5);
            assert_eq!(codec.decode(&encoded).unwrap().len(), 10);
        }
    }

    #[test]
    fn test_odd_pcm_length_rejected() {
        assert_eq!(
            PcmuCodec.encode(&[0u8; 3]).unwrap_err(),
            Error::BadFrameSize(3)
        );
    }

    #[test]
    fn test_properties() {
        assert_eq!(PcmuCodec.name(), "PCMU");
        assert_eq!(PcmuCodec.clock_rate(), 8000);
        assert_eq!(PcmuCodec.samples_per_frame(), 160);
        assert_eq!(PcmaCodec.name(), "PCMA");
        assert_eq!(PcmaCodec.channels(), 1);
    }
}
