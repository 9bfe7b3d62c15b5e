//! RFC 4733 DTMF telephone-event handling
//!
//! A digit on the wire is a run of 4-byte telephone-event payloads sharing
//! one RTP timestamp: progress packets every 20 ms with a growing duration
//! field, then three redundant end packets so a single loss cannot swallow
//! the digit. The receiver side groups packets by timestamp and reports a
//! digit once, either on the first end packet or on a timeout when every
//! end packet was lost.

use bytes::{BufMut, Bytes, BytesMut};
use std::time::{Duration, Instant};

use crate::error::Error;
use crate::packet::{RtpHeader, RtpPacket};
use crate::{Result, RtpSequenceNumber, RtpSsrc, RtpTimestamp};

/// Redundant end packets per event (RFC 4733 §2.5.1.4)
pub const DTMF_END_REDUNDANCY: usize = 3;

/// A group with no end packet is reported after this long without progress
pub const DTMF_END_TIMEOUT: Duration = Duration::from_millis(200);

/// Map a DTMF digit to its event code
pub fn digit_to_event(digit: char) -> Option<u8> {
    match digit.to_ascii_uppercase() {
        '0'..='9' => Some(digit as u8 - b'0'),
        '*' => Some(10),
        '#' => Some(11),
        c @ 'A'..='D' => Some(c as u8 - b'A' + 12),
        _ => None,
    }
}

/// Map an event code to its DTMF digit
pub fn event_to_digit(event: u8) -> Option<char> {
    match event {
        0..=9 => Some((b'0' + event) as char),
        10 => Some('*'),
        11 => Some('#'),
        12..=15 => Some((b'A' + event - 12) as char),
        _ => None,
    }
}

/// One telephone-event payload (4 bytes on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtmfEvent {
    /// Event code, 0–15 for DTMF digits
    pub event: u8,

    /// End-of-event bit
    pub end: bool,

    /// Attenuation in dBm0, 0–63
    pub volume: u8,

    /// Event duration in timestamp units
    pub duration: u16,
}

impl DtmfEvent {
    /// Serialize to the 4-byte wire form
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_u8(self.event);
        buf.put_u8(if self.end { 0x80 } else { 0 } | (self.volume & 0x3f));
        buf.put_u16(self.duration);
        buf.freeze()
    }

    /// Parse the 4-byte wire form
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::TooShort { required: 4, available: data.len() });
        }
        Ok(Self {
            event: data[0],
            end: data[1] & 0x80 != 0,
            volume: data[1] & 0x3f,
            duration: u16::from_be_bytes([data[2], data[3]]),
        })
    }

    /// The digit this event encodes, if it is a DTMF code
    pub fn digit(&self) -> Option<char> {
        event_to_digit(self.event)
    }
}

/// Build the packet train for one digit.
///
/// Returns `ceil(duration_ms / 20)` progress packets with durations growing
/// by one 20 ms step, the last reaching the total duration, followed by
/// three end packets repeating that total. All packets share `timestamp`;
/// only the first carries the marker bit. Sequence numbers count up from
/// `start_sequence`.
#[allow(clippy::too_many_arguments)]
pub fn build_digit_train(
    digit: char,
    duration_ms: u32,
    volume: u8,
    clock_rate: u32,
    payload_type: u8,
    ssrc: RtpSsrc,
    start_sequence: RtpSequenceNumber,
    timestamp: RtpTimestamp,
) -> Result<Vec<RtpPacket>> {
    let event = digit_to_event(digit)
        .ok_or_else(|| Error::InvalidParameter(format!("invalid DTMF digit: {:?}", digit)))?;

    let step_samples = clock_rate / 50;
    let steps = duration_ms.div_ceil(20).max(1);
    if steps * step_samples > u16::MAX as u32 {
        return Err(Error::InvalidParameter(format!(
            "DTMF duration {} ms overflows the 16-bit duration field",
            duration_ms
        )));
    }
    let step_samples = step_samples as u16;
    let steps = steps as u16;
    let total_samples = steps * step_samples;

    let mut packets = Vec::with_capacity(steps as usize + DTMF_END_REDUNDANCY);
    let mut sequence = start_sequence;

    for step in 1..=steps {
        let payload = DtmfEvent {
            event,
            end: false,
            volume,
            duration: step * step_samples,
        };
        let mut header = RtpHeader::new(payload_type, sequence, timestamp, ssrc);
        header.marker = step == 1;
        packets.push(RtpPacket::new(header, payload.serialize()));
        sequence = sequence.wrapping_add(1);
    }

    for _ in 0..DTMF_END_REDUNDANCY {
        let payload = DtmfEvent {
            event,
            end: true,
            volume,
            duration: total_samples,
        };
        let header = RtpHeader::new(payload_type, sequence, timestamp, ssrc);
        packets.push(RtpPacket::new(header, payload.serialize()));
        sequence = sequence.wrapping_add(1);
    }

    Ok(packets)
}

struct EventGroup {
    timestamp: RtpTimestamp,
    digit: char,
    reported: bool,
    last_duration: u16,
    last_progress: Instant,
}

/// Assembles telephone-event packets into digit reports
#[derive(Default)]
pub struct DtmfReceiver {
    current: Option<EventGroup>,
}

impl DtmfReceiver {
    /// Create a receiver with no event in flight
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one telephone-event RTP packet.
    ///
    /// Returns `Some((digit, duration))` exactly once per event group, on
    /// its first end packet. Malformed payloads and non-DTMF event codes
    /// are dropped.
    pub fn handle_packet(&mut self, packet: &RtpPacket) -> Option<(char, u16)> {
        let event = DtmfEvent::parse(&packet.payload).ok()?;
        let digit = event.digit()?;
        let timestamp = packet.header.timestamp;

        // a new timestamp starts a new group
        let new_group = !matches!(&self.current, Some(group) if group.timestamp == timestamp);
        if new_group {
            self.current = Some(EventGroup {
                timestamp,
                digit,
                reported: false,
                last_duration: event.duration,
                last_progress: Instant::now(),
            });
        }
        let group = self.current.as_mut()?;

        if event.end {
            if group.reported {
                return None;
            }
            group.reported = true;
            return Some((group.digit, event.duration));
        }

        group.last_duration = event.duration;
        group.last_progress = Instant::now();
        None
    }

    /// Report a group whose end packets never arrived.
    ///
    /// Called periodically by the session; emits the pending digit when
    /// more than [`DTMF_END_TIMEOUT`] has passed since its last progress
    /// packet.
    pub fn poll_timeout(&mut self, now: Instant) -> Option<(char, u16)> {
        let group = self.current.as_mut()?;
        if group.reported || now.duration_since(group.last_progress) < DTMF_END_TIMEOUT {
            return None;
        }
        group.reported = true;
        Some((group.digit, group.last_duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_packet(timestamp: u32, sequence: u16, event: DtmfEvent) -> RtpPacket {
        let header = RtpHeader::new(101, sequence, timestamp, 0x1234);
        RtpPacket::new(header, event.serialize())
    }

    #[test]
    fn test_event_roundtrip() {
        let event = DtmfEvent { event: 1, end: false, volume: 10, duration: 400 };
        let data = event.serialize();
        assert_eq!(data.len(), 4);
        assert_eq!(DtmfEvent::parse(&data).unwrap(), event);

        let end = DtmfEvent { event: 5, end: true, volume: 10, duration: 1280 };
        let parsed = DtmfEvent::parse(&end.serialize()).unwrap();
        assert!(parsed.end);
        assert_eq!(parsed.duration, 1280);
    }

    #[test]
    fn test_event_too_short() {
        assert!(matches!(
            DtmfEvent::parse(&[0, 0]),
            Err(Error::TooShort { required: 4, .. })
        ));
    }

    #[test]
    fn test_digit_mapping() {
        for (digit, code) in [('0', 0u8), ('9', 9), ('*', 10), ('#', 11), ('A', 12), ('D', 15)] {
            assert_eq!(digit_to_event(digit), Some(code));
            assert_eq!(event_to_digit(code), Some(digit));
        }
        assert_eq!(digit_to_event('a'), Some(12)); // case-insensitive
        assert_eq!(digit_to_event('x'), None);
        assert_eq!(event_to_digit(16), None);
    }

    #[test]
    fn test_train_shape() {
        // 200 ms at 8 kHz: 10 progress packets + 3 end packets
        let packets = build_digit_train('5', 200, 10, 8000, 101, 0xabcd, 100, 1000).unwrap();
        assert_eq!(packets.len(), 13);

        for (i, packet) in packets.iter().enumerate() {
            assert_eq!(packet.header.timestamp, 1000);
            assert_eq!(packet.header.payload_type, 101);
            assert_eq!(packet.header.sequence_number, 100 + i as u16);
            assert_eq!(packet.header.marker, i == 0);

            let event = DtmfEvent::parse(&packet.payload).unwrap();
            assert_eq!(event.event, 5);
            if i < 10 {
                assert!(!event.end);
                assert_eq!(event.duration, 160 * (i as u16 + 1));
            } else {
                assert!(event.end);
                assert_eq!(event.duration, 1600);
            }
        }
    }

    #[test]
    fn test_train_rounds_up() {
        // 160 ms: 8 progress + 3 end, total duration 1280
        let packets = build_digit_train('1', 160, 10, 8000, 101, 0, 0, 0).unwrap();
        assert_eq!(packets.len(), 11);
        let last = DtmfEvent::parse(&packets[10].payload).unwrap();
        assert_eq!(last.duration, 1280);

        // 25 ms rounds up to two steps
        let packets = build_digit_train('1', 25, 10, 8000, 101, 0, 0, 0).unwrap();
        assert_eq!(packets.len(), 2 + 3);
    }

    #[test]
    fn test_invalid_digit() {
        assert!(matches!(
            build_digit_train('q', 100, 10, 8000, 101, 0, 0, 0),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_overlong_duration_rejected() {
        // 10 s at 8 kHz would overflow the 16-bit duration field
        assert!(matches!(
            build_digit_train('1', 10_000, 10, 8000, 101, 0, 0, 0),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_receiver_reports_on_end() {
        let mut receiver = DtmfReceiver::new();

        let progress = DtmfEvent { event: 1, end: false, volume: 10, duration: 400 };
        assert_eq!(receiver.handle_packet(&event_packet(1000, 100, progress)), None);

        let end = DtmfEvent { event: 1, end: true, volume: 10, duration: 1280 };
        assert_eq!(
            receiver.handle_packet(&event_packet(1000, 101, end)),
            Some(('1', 1280))
        );
    }

    #[test]
    fn test_receiver_suppresses_duplicate_ends() {
        let mut receiver = DtmfReceiver::new();
        let end = DtmfEvent { event: 5, end: true, volume: 10, duration: 1280 };

        let mut reports = 0;
        for seq in 0..3 {
            if receiver.handle_packet(&event_packet(2000, seq, end)).is_some() {
                reports += 1;
            }
        }
        assert_eq!(reports, 1);
    }

    #[test]
    fn test_receiver_two_digits() {
        let mut receiver = DtmfReceiver::new();
        let first = DtmfEvent { event: 1, end: true, volume: 10, duration: 1280 };
        let second = DtmfEvent { event: 2, end: true, volume: 10, duration: 1280 };

        assert_eq!(
            receiver.handle_packet(&event_packet(1000, 100, first)),
            Some(('1', 1280))
        );
        assert_eq!(
            receiver.handle_packet(&event_packet(2000, 101, second)),
            Some(('2', 1280))
        );
    }

    #[test]
    fn test_receiver_drops_unknown_codes() {
        let mut receiver = DtmfReceiver::new();
        let bogus = DtmfEvent { event: 42, end: true, volume: 10, duration: 100 };
        assert_eq!(receiver.handle_packet(&event_packet(1000, 1, bogus)), None);
    }

    #[test]
    fn test_timeout_reports_lost_end() {
        let mut receiver = DtmfReceiver::new();
        let progress = DtmfEvent { event: 3, end: false, volume: 10, duration: 480 };
        receiver.handle_packet(&event_packet(5000, 7, progress));

        let now = Instant::now();
        assert_eq!(receiver.poll_timeout(now), None);
        assert_eq!(
            receiver.poll_timeout(now + Duration::from_millis(250)),
            Some(('3', 480))
        );
        // and only once
        assert_eq!(receiver.poll_timeout(now + Duration::from_millis(500)), None);
    }
}
