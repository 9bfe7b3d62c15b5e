//! Per-stream reception statistics
//!
//! Tracks the RFC 3550 receiver state for one remote source: highest
//! sequence number with cycle counting, expected/received packet counts,
//! interval-based fraction lost, and the A.8 interarrival jitter estimate
//! in Q4 fixed point. The session feeds every accepted RTP packet through
//! here and reads the fields out when it builds report blocks.

use std::time::Instant;

use crate::packet::rtcp::clamp_packets_lost;
use crate::packet::{seq_gt, RtpPacket};
use crate::RtpSequenceNumber;

/// Reception statistics for a single SSRC
pub struct StreamStatistics {
    clock_rate: u32,
    epoch: Instant,

    base_seq: Option<RtpSequenceNumber>,
    max_seq: Option<RtpSequenceNumber>,
    /// Sequence cycle accumulator, kept pre-shifted into the top 16 bits
    cycles: u32,
    packets_received: u32,

    // jitter, RFC 3550 A.8
    jitter_q4: i64,
    last_arrival: Option<i64>,
    last_timestamp: Option<u32>,

    // fraction lost interval state
    expected_prior: u32,
    received_prior: u32,
}

impl StreamStatistics {
    /// Create statistics for a stream with the given RTP clock rate
    pub fn new(clock_rate: u32) -> Self {
        Self {
            clock_rate,
            epoch: Instant::now(),
            base_seq: None,
            max_seq: None,
            cycles: 0,
            packets_received: 0,
            jitter_q4: 0,
            last_arrival: None,
            last_timestamp: None,
            expected_prior: 0,
            received_prior: 0,
        }
    }

    /// Record a received packet, stamping its arrival from the wall clock
    pub fn add(&mut self, packet: &RtpPacket) {
        let arrival =
            (self.epoch.elapsed().as_secs_f64() * self.clock_rate as f64) as i64;
        self.add_with_arrival(packet, arrival);
    }

    fn add_with_arrival(&mut self, packet: &RtpPacket, arrival: i64) {
        let seq = packet.header.sequence_number;
        let in_order = self.max_seq.map_or(true, |max| seq_gt(seq, max));
        self.packets_received = self.packets_received.wrapping_add(1);

        if self.base_seq.is_none() {
            self.base_seq = Some(seq);
        }
        if !in_order {
            return;
        }

        if let Some(max) = self.max_seq {
            // ahead on the circle but numerically lower means a wrap
            if seq < max {
                self.cycles = self.cycles.wrapping_add(1 << 16);
            }
        }
        self.max_seq = Some(seq);

        let timestamp = packet.header.timestamp;
        if self.last_timestamp != Some(timestamp) && self.packets_received > 1 {
            if let (Some(last_arrival), Some(last_timestamp)) =
                (self.last_arrival, self.last_timestamp)
            {
                let transit_delta = timestamp.wrapping_sub(last_timestamp) as i32 as i64;
                let diff = ((arrival - last_arrival) - transit_delta).abs();
                self.jitter_q4 += diff - ((self.jitter_q4 + 8) >> 4);
            }
        }
        self.last_arrival = Some(arrival);
        self.last_timestamp = Some(timestamp);
    }

    /// Packets the sender must have emitted, judging by sequence numbers
    pub fn packets_expected(&self) -> u32 {
        match (self.base_seq, self.max_seq) {
            (Some(base), Some(max)) => self
                .cycles
                .wrapping_add(max as u32)
                .wrapping_sub(base as u32)
                .wrapping_add(1),
            _ => 0,
        }
    }

    /// Packets actually received
    pub fn packets_received(&self) -> u32 {
        self.packets_received
    }

    /// Cumulative loss, clamped to the report block's 24-bit range
    pub fn packets_lost(&self) -> i32 {
        clamp_packets_lost(self.packets_expected() as i64 - self.packets_received as i64)
    }

    /// Extended highest sequence number: cycles above, last sequence below
    pub fn extended_highest_sequence(&self) -> u32 {
        self.cycles | self.max_seq.unwrap_or(0) as u32
    }

    /// Current jitter estimate in timestamp units
    pub fn jitter(&self) -> u32 {
        (self.jitter_q4 >> 4).max(0) as u32
    }

    /// Loss fraction over the interval since the previous call, in 1/256
    /// units. Resets the interval counters, so call once per report.
    pub fn fraction_lost(&mut self) -> u8 {
        let expected = self.packets_expected();
        let expected_interval = expected.wrapping_sub(self.expected_prior);
        self.expected_prior = expected;

        let received_interval = self.packets_received.wrapping_sub(self.received_prior);
        self.received_prior = self.packets_received;

        let lost_interval = expected_interval as i64 - received_interval as i64;
        if expected_interval == 0 || lost_interval <= 0 {
            0
        } else {
            ((lost_interval << 8) / expected_interval as i64) as u8
        }
    }
}
