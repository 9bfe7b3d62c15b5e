//! RTCP transmission-interval computation (RFC 3550 §6.3)

use rand::Rng;
use std::time::Duration;

/// Minimum deterministic interval between reports
pub const RTCP_MIN_INTERVAL: Duration = Duration::from_secs(5);

/// Fraction of the session bandwidth given to RTCP
pub const RTCP_BANDWIDTH_FRACTION: f64 = 0.05;

/// Seed for the average-compound-size estimator, in bytes
const INITIAL_AVG_RTCP_SIZE: f64 = 128.0;

/// Share of the RTCP bandwidth reserved for senders when they are few
const RTCP_SENDER_BANDWIDTH_FRACTION: f64 = 0.25;

/// Member count below which a BYE goes out without reconsideration
const BYE_RECONSIDERATION_THRESHOLD: u32 = 50;

/// Computes randomized RTCP report intervals for one session.
///
/// The deterministic interval scales the average compound size by the
/// member count against the RTCP bandwidth share and never drops below the
/// minimum (halved before the first report). Each emitted interval is the
/// deterministic value scaled uniformly from [0.5, 1.5), so the long-run
/// mean sits on the deterministic interval itself.
pub struct RtcpScheduler {
    /// RTCP bandwidth share in bits per second
    rtcp_bandwidth: u32,

    /// Deterministic floor for the interval
    min_interval: Duration,

    /// Session members, ourselves included
    members: u32,

    /// Members that have sent RTP recently
    senders: u32,

    /// Whether we are one of the senders
    we_sent: bool,

    /// EWMA of compound packet sizes, sent and received
    avg_rtcp_size: f64,

    /// True until the first interval has been handed out
    initial: bool,
}

impl RtcpScheduler {
    /// Create a scheduler for the given RTCP bandwidth share
    pub fn new(rtcp_bandwidth: u32, min_interval: Duration) -> Self {
        Self {
            rtcp_bandwidth: rtcp_bandwidth.max(1),
            min_interval,
            members: 2,
            senders: 0,
            we_sent: false,
            avg_rtcp_size: INITIAL_AVG_RTCP_SIZE,
            initial: true,
        }
    }

    /// Update the session member count
    pub fn set_members(&mut self, members: u32) {
        self.members = members.max(1);
    }

    /// Update the sender count and whether we belong to it
    pub fn set_senders(&mut self, senders: u32, we_sent: bool) {
        self.senders = senders;
        self.we_sent = we_sent;
    }

    /// Fold a compound packet size into the running average (1/16 gain)
    pub fn record_packet(&mut self, size: usize) {
        self.avg_rtcp_size = self.avg_rtcp_size * (15.0 / 16.0) + size as f64 / 16.0;
    }

    /// The interval before randomization.
    ///
    /// While senders are a small minority they split off a quarter of the
    /// RTCP bandwidth (RFC 3550 §6.3.1); otherwise everyone shares it.
    pub fn deterministic_interval(&self) -> Duration {
        let floor = if self.initial {
            self.min_interval / 2
        } else {
            self.min_interval
        };

        let bandwidth = self.rtcp_bandwidth as f64;
        let (share, bandwidth) = if self.senders > 0
            && (self.senders as f64) < self.members as f64 * RTCP_SENDER_BANDWIDTH_FRACTION
        {
            if self.we_sent {
                (self.senders, bandwidth * RTCP_SENDER_BANDWIDTH_FRACTION)
            } else {
                (
                    self.members - self.senders,
                    bandwidth * (1.0 - RTCP_SENDER_BANDWIDTH_FRACTION),
                )
            }
        } else {
            (self.members, bandwidth)
        };

        let t = self.avg_rtcp_size * 8.0 * share as f64 / bandwidth;
        Duration::from_secs_f64(t).max(floor)
    }

    /// Draw the next report interval
    pub fn next_interval(&mut self, rng: &mut impl Rng) -> Duration {
        let interval = self.deterministic_interval();
        self.initial = false;
        interval.mul_f64(rng.gen_range(0.5..1.5))
    }

    /// Delay to apply before a BYE (the `n/2` reconsideration rule).
    ///
    /// With fewer than 50 members the BYE may be sent immediately; larger
    /// sessions draw over an interval scaled to half the member count.
    pub fn bye_delay(&self, rng: &mut impl Rng) -> Duration {
        if self.members < BYE_RECONSIDERATION_THRESHOLD {
            return Duration::ZERO;
        }
        let t = self.avg_rtcp_size * 8.0 * (self.members as f64 / 2.0)
            / self.rtcp_bandwidth as f64;
        Duration::from_secs_f64(t).mul_f64(rng.gen_range(0.5..1.5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_interval_is_halved() {
        let scheduler = RtcpScheduler::new(3200, RTCP_MIN_INTERVAL);
        assert_eq!(scheduler.deterministic_interval(), Duration::from_millis(2500));
    }

    #[test]
    fn test_minimum_enforced_after_first() {
        let mut scheduler = RtcpScheduler::new(3200, RTCP_MIN_INTERVAL);
        let mut rng = rand::thread_rng();
        let _ = scheduler.next_interval(&mut rng);

        for _ in 0..100 {
            assert!(scheduler.deterministic_interval() >= RTCP_MIN_INTERVAL);
            let _ = scheduler.next_interval(&mut rng);
        }
    }

    #[test]
    fn test_draw_range_and_mean() {
        let mut scheduler = RtcpScheduler::new(3200, RTCP_MIN_INTERVAL);
        let mut rng = rand::thread_rng();
        let _ = scheduler.next_interval(&mut rng);
        let nominal = scheduler.deterministic_interval().as_secs_f64();

        let mut total = 0.0;
        for _ in 0..1000 {
            let draw = scheduler.next_interval(&mut rng).as_secs_f64();
            assert!(draw >= nominal * 0.5 && draw < nominal * 1.5);
            total += draw;
        }
        let mean = total / 1000.0;
        assert!(
            (mean - nominal).abs() < nominal * 0.1,
            "mean {} too far from nominal {}",
            mean,
            nominal
        );
    }

    #[test]
    fn test_bandwidth_scales_interval() {
        // enough members that the bandwidth term dominates the minimum
        let mut narrow = RtcpScheduler::new(800, RTCP_MIN_INTERVAL);
        let mut wide = RtcpScheduler::new(64_000, RTCP_MIN_INTERVAL);
        narrow.set_members(100);
        wide.set_members(100);

        assert!(narrow.deterministic_interval() > wide.deterministic_interval());
    }

    #[test]
    fn test_sender_minority_bandwidth_split() {
        let mut scheduler = RtcpScheduler::new(64_000, Duration::from_millis(1));
        scheduler.set_members(100);

        // 10 senders split a quarter of the bandwidth among themselves
        scheduler.set_senders(10, true);
        let sender_interval = scheduler.deterministic_interval();
        scheduler.set_senders(10, false);
        let receiver_interval = scheduler.deterministic_interval();
        assert!(sender_interval < receiver_interval);

        // once senders are no minority, everyone shares the whole pool
        scheduler.set_senders(60, true);
        let shared = scheduler.deterministic_interval();
        assert!(shared > sender_interval && shared < receiver_interval);
    }

    #[test]
    fn test_avg_size_ewma() {
        let mut scheduler = RtcpScheduler::new(3200, RTCP_MIN_INTERVAL);
        for _ in 0..200 {
            scheduler.record_packet(96);
        }
        // converged to the observed size
        assert!((scheduler.avg_rtcp_size - 96.0).abs() < 1.0);
    }

    #[test]
    fn test_small_session_bye_is_immediate() {
        let scheduler = RtcpScheduler::new(3200, RTCP_MIN_INTERVAL);
        assert_eq!(scheduler.bye_delay(&mut rand::thread_rng()), Duration::ZERO);
    }

    #[test]
    fn test_large_session_bye_is_delayed() {
        let mut scheduler = RtcpScheduler::new(3200, RTCP_MIN_INTERVAL);
        scheduler.set_members(200);
        assert!(scheduler.bye_delay(&mut rand::thread_rng()) > Duration::ZERO);
    }
}
