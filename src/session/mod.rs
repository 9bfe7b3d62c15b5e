//! RTP Session Management
//!
//! An [`RtpSession`] binds a datagram channel to one remote peer and runs
//! the full audio transport on top of it: payload encode/decode, sequence
//! and timestamp progression, jitter buffering on the receive path, DTMF
//! event framing, and periodic RTCP sender/receiver reports.
//!
//! Each session owns two cooperative tasks: a receive task that blocks on
//! the channel (plus a coarse tick for DTMF end-timeout detection) and an
//! RTCP timer task that sleeps between reports. All session state lives
//! behind one mutex, and user callbacks run inline on the receive task —
//! they must return quickly, must not call back into the session, and must
//! not hold strong references to it.

mod scheduling;

pub use scheduling::{RtcpScheduler, RTCP_BANDWIDTH_FRACTION, RTCP_MIN_INTERVAL};

use bytes::Bytes;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::buffer::{JitterBuffer, JitterEntry, DEFAULT_CAPACITY, DEFAULT_PREFETCH};
use crate::codec::{default_registry, AudioCodec};
use crate::dtmf::{build_digit_train, DtmfReceiver, DTMF_END_REDUNDANCY};
use crate::error::Error;
use crate::packet::rtcp::{
    NtpTimestamp, RtcpGoodbye, RtcpPacket, RtcpReceiverReport, RtcpReportBlock,
    RtcpSenderReport, RtcpSourceDescription,
};
use crate::packet::{is_rtcp, RtpHeader, RtpPacket};
use crate::stats::StreamStatistics;
use crate::transport::{DatagramChannel, UdpChannel};
use crate::{Result, RtpSequenceNumber, RtpSsrc, RtpTimestamp, DEFAULT_MAX_PACKET_SIZE};

/// Default RFC 4733 telephone-event payload type
pub const DEFAULT_DTMF_PAYLOAD_TYPE: u8 = 101;

/// Consecutive receive failures after which the channel is treated as dead
const CHANNEL_ERROR_LIMIT: u32 = 32;

/// User hook for decoded audio: host PCM (s16le) and the frame timestamp
pub type AudioCallback = Box<dyn FnMut(Bytes, RtpTimestamp) + Send>;

/// User hook for assembled DTMF digits: digit and duration in clock units
pub type DtmfCallback = Box<dyn FnMut(char, u16) + Send>;

/// User hook for RTCP activity
pub type RtcpCallback = Box<dyn FnMut(RtcpNotice) + Send>;

/// RTCP-plane events delivered to the `on_rtcp` hook
#[derive(Debug, Clone)]
pub enum RtcpNotice {
    /// A received compound packet, in wire order
    Compound(Vec<RtcpPacket>),

    /// The local SSRC was rerolled after a collision with the remote
    LocalSsrcChanged {
        /// SSRC the session used before the collision
        old: RtpSsrc,
        /// SSRC it uses from now on
        new: RtpSsrc,
    },
}

/// RTP session configuration options
#[derive(Debug, Clone)]
pub struct RtpSessionConfig {
    /// Local address to bind to
    pub local_addr: SocketAddr,

    /// Remote address to send packets to
    pub remote_addr: SocketAddr,

    /// Outbound payload type; must be registered in the codec registry
    pub payload_type: u8,

    /// SSRC override; a random non-zero value is drawn when unset
    pub ssrc: Option<RtpSsrc>,

    /// Jitter buffer capacity in packets
    pub jitter_capacity: usize,

    /// Frames to buffer before the first emission
    pub jitter_prefetch: usize,

    /// RTCP bandwidth share in bits per second; defaults to 5% of the
    /// codec's nominal stream bandwidth
    pub rtcp_bandwidth: Option<u32>,

    /// Deterministic floor for the RTCP report interval
    pub rtcp_min_interval: Duration,

    /// Payload type carrying telephone events
    pub dtmf_payload_type: u8,

    /// CNAME for SDES; defaults to `user@<hostname>`
    pub cname: Option<String>,

    /// How long `close()` waits for in-flight sends to drain
    pub close_grace: Duration,
}

impl Default for RtpSessionConfig {
    fn default() -> Self {
        Self {
            local_addr: "0.0.0.0:0".parse().unwrap(),
            remote_addr: "127.0.0.1:0".parse().unwrap(),
            payload_type: 0,
            ssrc: None,
            jitter_capacity: DEFAULT_CAPACITY,
            jitter_prefetch: DEFAULT_PREFETCH,
            rtcp_bandwidth: None,
            rtcp_min_interval: RTCP_MIN_INTERVAL,
            dtmf_payload_type: DEFAULT_DTMF_PAYLOAD_TYPE,
            cname: None,
            close_grace: Duration::from_millis(250),
        }
    }
}

/// Stats snapshot for an RTP session
#[derive(Debug, Clone, Default)]
pub struct RtpSessionStats {
    /// Total RTP packets sent
    pub packets_sent: u32,

    /// Total payload octets sent
    pub octets_sent: u32,

    /// Total RTP packets received
    pub packets_received: u64,

    /// Total payload octets received
    pub octets_received: u64,

    /// Cumulative loss derived from sequence numbers
    pub packets_lost: i32,

    /// Interarrival jitter estimate in timestamp units
    pub jitter: u32,

    /// Inbound datagrams that failed to parse
    pub parse_failures: u64,

    /// Frames the codec refused to decode
    pub decode_failures: u64,

    /// Remote SSRC once latched
    pub remote_ssrc: Option<RtpSsrc>,
}

/// Session lifecycle, advancing only forward except Active ⇄ Draining
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed but not yet bound
    Initial,

    /// Channel bound, tasks not yet running
    Bound,

    /// Sending and receiving
    Active,

    /// Close requested, BYE and in-flight sends draining
    Draining,

    /// Fully shut down; operations fail
    Closed,
}

struct SessionInner {
    state: SessionState,

    // outbound
    local_ssrc: RtpSsrc,
    sequence: RtpSequenceNumber,
    timestamp: RtpTimestamp,
    packets_sent: u32,
    octets_sent: u32,
    sent_since_report: bool,
    pending_sends: usize,

    // inbound
    remote_ssrc: Option<RtpSsrc>,
    jitter: JitterBuffer,
    dtmf_receiver: DtmfReceiver,
    stream_stats: Option<StreamStatistics>,
    packets_received: u64,
    octets_received: u64,
    parse_failures: u64,
    decode_failures: u64,

    // RTCP sync with the remote sender
    last_sr_ntp: Option<NtpTimestamp>,
    last_sr_arrival: Option<Instant>,
    scheduler: RtcpScheduler,

    // user hooks
    on_audio: Option<AudioCallback>,
    on_dtmf: Option<DtmfCallback>,
    on_rtcp: Option<RtcpCallback>,
}

/// RTP session bound to one local socket and one remote peer
pub struct RtpSession {
    config: RtpSessionConfig,
    cname: String,
    channel: Arc<dyn DatagramChannel>,
    codec: Arc<dyn AudioCodec>,
    inner: Arc<Mutex<SessionInner>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
    rtcp_task: Mutex<Option<JoinHandle<()>>>,
}

fn random_nonzero_ssrc() -> RtpSsrc {
    let mut rng = rand::thread_rng();
    loop {
        let ssrc = rng.gen::<u32>();
        if ssrc != 0 {
            return ssrc;
        }
    }
}

fn default_cname() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("user@{}", host)
}

impl RtpSession {
    /// Bind a UDP socket and start a session over it.
    ///
    /// Dropping the future before it resolves releases any socket it had
    /// already bound.
    pub async fn connect(config: RtpSessionConfig) -> Result<Self> {
        let channel = Arc::new(UdpChannel::bind(config.local_addr).await?);
        Self::with_channel(config, channel).await
    }

    /// Start a session over an already bound channel, resolving the codec
    /// from the process default registry
    pub async fn with_channel(
        config: RtpSessionConfig,
        channel: Arc<dyn DatagramChannel>,
    ) -> Result<Self> {
        let codec = default_registry().lookup(config.payload_type)?;
        Self::with_codec(config, channel, codec).await
    }

    /// Start a session with an explicit codec, bypassing the registry.
    ///
    /// This is the hook for dynamic payload types: an Opus implementation
    /// of [`AudioCodec`], or a codec from a test-local registry.
    pub async fn with_codec(
        config: RtpSessionConfig,
        channel: Arc<dyn DatagramChannel>,
        codec: Arc<dyn AudioCodec>,
    ) -> Result<Self> {
        let local_ssrc = config.ssrc.unwrap_or_else(random_nonzero_ssrc);
        let rtcp_bandwidth = config.rtcp_bandwidth.unwrap_or_else(|| {
            (codec.clock_rate() as f64 * 8.0 * RTCP_BANDWIDTH_FRACTION) as u32
        });
        let cname = config.cname.clone().unwrap_or_else(default_cname);

        let (sequence, timestamp) = {
            let mut rng = rand::thread_rng();
            (rng.gen::<u16>(), rng.gen::<u32>())
        };

        let inner = Arc::new(Mutex::new(SessionInner {
            state: SessionState::Bound,
            local_ssrc,
            sequence,
            timestamp,
            packets_sent: 0,
            octets_sent: 0,
            sent_since_report: false,
            pending_sends: 0,
            remote_ssrc: None,
            jitter: JitterBuffer::new(config.jitter_capacity, config.jitter_prefetch),
            dtmf_receiver: DtmfReceiver::new(),
            stream_stats: None,
            packets_received: 0,
            octets_received: 0,
            parse_failures: 0,
            decode_failures: 0,
            last_sr_ntp: None,
            last_sr_arrival: None,
            scheduler: RtcpScheduler::new(rtcp_bandwidth, config.rtcp_min_interval),
            on_audio: None,
            on_dtmf: None,
            on_rtcp: None,
        }));

        let session = Self {
            config,
            cname,
            channel,
            codec,
            inner,
            recv_task: Mutex::new(None),
            rtcp_task: Mutex::new(None),
        };
        session.start()?;

        info!("started RTP session with SSRC={:08x}", local_ssrc);
        Ok(session)
    }

    fn start(&self) -> Result<()> {
        {
            let mut guard = self.lock()?;
            guard.state = SessionState::Active;
        }

        // receive task: channel reads plus the DTMF timeout tick
        let recv_inner = self.inner.clone();
        let recv_channel = self.channel.clone();
        let recv_codec = self.codec.clone();
        let dtmf_payload_type = self.config.dtmf_payload_type;
        let recv_handle = tokio::spawn(async move {
            let mut buf = vec![0u8; DEFAULT_MAX_PACKET_SIZE];
            let mut tick = tokio::time::interval(Duration::from_millis(50));
            let mut consecutive_errors = 0u32;

            loop {
                tokio::select! {
                    result = recv_channel.recv_from(&mut buf) => match result {
                        Ok((len, _from)) => {
                            consecutive_errors = 0;
                            Self::handle_datagram(
                                &recv_inner,
                                &recv_codec,
                                dtmf_payload_type,
                                &buf[..len],
                            );
                        }
                        Err(e) => {
                            let Ok(mut guard) = recv_inner.lock() else { break };
                            if guard.state != SessionState::Active {
                                break;
                            }
                            consecutive_errors += 1;
                            if consecutive_errors >= CHANNEL_ERROR_LIMIT {
                                warn!("channel looks dead ({}), closing session", e);
                                guard.state = SessionState::Closed;
                                break;
                            }
                            warn!("receive error, continuing: {}", e);
                        }
                    },
                    _ = tick.tick() => {
                        let Ok(mut guard) = recv_inner.lock() else { break };
                        if guard.state == SessionState::Closed {
                            break;
                        }
                        if let Some((digit, duration)) =
                            guard.dtmf_receiver.poll_timeout(Instant::now())
                        {
                            if let Some(callback) = guard.on_dtmf.as_mut() {
                                callback(digit, duration);
                            }
                        }
                    }
                }
            }
        });

        // RTCP timer task
        let rtcp_inner = self.inner.clone();
        let rtcp_channel = self.channel.clone();
        let remote_addr = self.config.remote_addr;
        let cname = self.cname.clone();
        let rtcp_handle = tokio::spawn(async move {
            loop {
                let interval = {
                    let Ok(mut guard) = rtcp_inner.lock() else { break };
                    if guard.state != SessionState::Active {
                        break;
                    }
                    let senders =
                        guard.sent_since_report as u32 + guard.remote_ssrc.is_some() as u32;
                    let we_sent = guard.sent_since_report;
                    guard.scheduler.set_senders(senders, we_sent);
                    guard.scheduler.next_interval(&mut rand::thread_rng())
                };
                tokio::time::sleep(interval).await;

                let report = {
                    let Ok(mut guard) = rtcp_inner.lock() else { break };
                    if guard.state != SessionState::Active {
                        break;
                    }
                    Self::build_report(&mut guard, &cname)
                };
                match report {
                    Ok(data) => {
                        if let Err(e) = rtcp_channel.send_to(&data, remote_addr).await {
                            warn!("failed to send RTCP report: {}", e);
                        } else {
                            trace!("sent RTCP report ({} bytes)", data.len());
                            if let Ok(mut guard) = rtcp_inner.lock() {
                                guard.scheduler.record_packet(data.len());
                            }
                        }
                    }
                    Err(e) => warn!("failed to build RTCP report: {}", e),
                }
            }
        });

        if let Ok(mut slot) = self.recv_task.lock() {
            *slot = Some(recv_handle);
        }
        if let Ok(mut slot) = self.rtcp_task.lock() {
            *slot = Some(rtcp_handle);
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionInner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Transport("session state poisoned".to_string()))
    }

    /// Set the decoded-audio hook
    pub fn set_on_audio(&self, callback: impl FnMut(Bytes, RtpTimestamp) + Send + 'static) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.on_audio = Some(Box::new(callback));
        }
    }

    /// Set the DTMF digit hook
    pub fn set_on_dtmf(&self, callback: impl FnMut(char, u16) + Send + 'static) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.on_dtmf = Some(Box::new(callback));
        }
    }

    /// Set the RTCP hook
    pub fn set_on_rtcp(&self, callback: impl FnMut(RtcpNotice) + Send + 'static) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.on_rtcp = Some(Box::new(callback));
        }
    }

    /// The SSRC this session currently sends with
    pub fn local_ssrc(&self) -> RtpSsrc {
        self.inner.lock().map(|g| g.local_ssrc).unwrap_or(0)
    }

    /// The locally bound address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.channel.local_addr()
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.inner
            .lock()
            .map(|g| g.state)
            .unwrap_or(SessionState::Closed)
    }

    /// Snapshot the session statistics
    pub fn stats(&self) -> RtpSessionStats {
        match self.inner.lock() {
            Ok(guard) => RtpSessionStats {
                packets_sent: guard.packets_sent,
                octets_sent: guard.octets_sent,
                packets_received: guard.packets_received,
                octets_received: guard.octets_received,
                packets_lost: guard.stream_stats.as_ref().map_or(0, |s| s.packets_lost()),
                jitter: guard.stream_stats.as_ref().map_or(0, |s| s.jitter()),
                parse_failures: guard.parse_failures,
                decode_failures: guard.decode_failures,
                remote_ssrc: guard.remote_ssrc,
            },
            Err(_) => RtpSessionStats::default(),
        }
    }

    /// Encode host PCM (s16le) with the session codec and send it.
    ///
    /// When `timestamp` is omitted the outbound timestamp advances by the
    /// number of samples in `pcm`; when given, it also re-bases the
    /// progression for subsequent sends.
    pub async fn send_audio_pcm(&self, pcm: &[u8], timestamp: Option<RtpTimestamp>) -> Result<()> {
        let payload = self.codec.encode(pcm)?;
        let samples = (pcm.len() / 2 / self.codec.channels().max(1) as usize) as u32;
        self.send_payload(payload, timestamp, Some(samples), false).await
    }

    /// Send an already encoded payload without touching the codec
    pub async fn send_audio_encoded(
        &self,
        payload: Bytes,
        timestamp: RtpTimestamp,
        marker: bool,
    ) -> Result<()> {
        self.send_payload(payload, Some(timestamp), None, marker).await
    }

    async fn send_payload(
        &self,
        payload: Bytes,
        timestamp: Option<RtpTimestamp>,
        advance: Option<u32>,
        marker: bool,
    ) -> Result<()> {
        let data = {
            let mut guard = self.lock()?;
            Self::ensure_active(&guard)?;

            let sequence = guard.sequence;
            guard.sequence = guard.sequence.wrapping_add(1);
            let ts = timestamp.unwrap_or(guard.timestamp);
            if let Some(samples) = advance {
                guard.timestamp = ts.wrapping_add(samples);
            }

            let mut header = RtpHeader::new(
                self.config.payload_type,
                sequence,
                ts,
                guard.local_ssrc,
            );
            header.marker = marker;
            let data = RtpPacket::new(header, payload.clone()).serialize()?;

            guard.packets_sent = guard.packets_sent.wrapping_add(1);
            guard.octets_sent = guard.octets_sent.wrapping_add(payload.len() as u32);
            guard.sent_since_report = true;
            guard.pending_sends += 1;
            data
        };

        let result = self.channel.send_to(&data, self.config.remote_addr).await;
        if let Ok(mut guard) = self.inner.lock() {
            guard.pending_sends -= 1;
        }
        result.map(|_| ())
    }

    /// Send one DTMF digit as a telephone-event packet train.
    ///
    /// Progress packets go out every 20 ms; the three redundant end
    /// packets follow back to back, so the call resolves after roughly
    /// `duration_ms`. When `timestamp` is omitted the current outbound
    /// timestamp is used as the event timestamp. The audio timestamp
    /// progression is left untouched: telephone events carry their own
    /// duration field.
    pub async fn send_dtmf(
        &self,
        digit: char,
        duration_ms: u32,
        timestamp: Option<RtpTimestamp>,
    ) -> Result<()> {
        let packets = {
            let mut guard = self.lock()?;
            Self::ensure_active(&guard)?;

            let ts = timestamp.unwrap_or(guard.timestamp);
            let packets = build_digit_train(
                digit,
                duration_ms,
                10,
                8000,
                self.config.dtmf_payload_type,
                guard.local_ssrc,
                guard.sequence,
                ts,
            )?;
            guard.sequence = guard.sequence.wrapping_add(packets.len() as u16);
            guard.packets_sent = guard.packets_sent.wrapping_add(packets.len() as u32);
            guard.octets_sent = guard
                .octets_sent
                .wrapping_add(packets.iter().map(|p| p.payload.len() as u32).sum());
            guard.sent_since_report = true;
            guard.pending_sends += 1;
            packets
        };

        let progress_count = packets.len() - DTMF_END_REDUNDANCY;
        let mut result = Ok(());
        for (i, packet) in packets.iter().enumerate() {
            if i > 0 && i <= progress_count {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            let data = match packet.serialize() {
                Ok(data) => data,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            };
            if let Err(e) = self.channel.send_to(&data, self.config.remote_addr).await {
                result = Err(e);
                break;
            }
        }
        if let Ok(mut guard) = self.inner.lock() {
            guard.pending_sends -= 1;
        }
        result
    }

    fn ensure_active(guard: &SessionInner) -> Result<()> {
        match guard.state {
            SessionState::Active => Ok(()),
            SessionState::Initial | SessionState::Bound => Err(Error::NotBound),
            SessionState::Draining | SessionState::Closed => Err(Error::AlreadyClosed),
        }
    }

    /// Close the session: stop reporting, send a BYE, drain in-flight
    /// sends up to the configured grace period and release the channel.
    /// Idempotent; later calls return immediately.
    pub async fn close(&self) -> Result<()> {
        let local_ssrc = {
            let mut guard = self.lock()?;
            match guard.state {
                SessionState::Draining | SessionState::Closed => return Ok(()),
                _ => guard.state = SessionState::Draining,
            }
            guard.local_ssrc
        };

        // stop the periodic reports before the goodbye goes out
        if let Ok(mut slot) = self.rtcp_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }

        let bye_delay = {
            let guard = self.lock()?;
            guard.scheduler.bye_delay(&mut rand::thread_rng())
        };
        if !bye_delay.is_zero() {
            tokio::time::sleep(bye_delay).await;
        }

        let compound = RtcpPacket::serialize_compound(&[
            RtcpPacket::Goodbye(RtcpGoodbye::new(local_ssrc)),
            RtcpPacket::SourceDescription(RtcpSourceDescription::cname(
                local_ssrc,
                self.cname.clone(),
            )),
        ])?;
        if let Err(e) = self.channel.send_to(&compound, self.config.remote_addr).await {
            warn!("failed to send BYE: {}", e);
        }

        // wait for in-flight sends, bounded by the grace period
        let deadline = Instant::now() + self.config.close_grace;
        loop {
            if self.lock()?.pending_sends == 0 || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        if let Ok(mut slot) = self.recv_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        let _ = self.channel.close().await;

        self.lock()?.state = SessionState::Closed;
        info!("closed RTP session with SSRC={:08x}", local_ssrc);
        Ok(())
    }

    fn handle_datagram(
        inner: &Arc<Mutex<SessionInner>>,
        codec: &Arc<dyn AudioCodec>,
        dtmf_payload_type: u8,
        data: &[u8],
    ) {
        if is_rtcp(data) {
            Self::handle_rtcp(inner, data);
        } else {
            Self::handle_rtp(inner, codec, dtmf_payload_type, data);
        }
    }

    fn handle_rtcp(inner: &Arc<Mutex<SessionInner>>, data: &[u8]) {
        let packets = match RtcpPacket::parse_compound(data) {
            Ok(packets) => packets,
            Err(e) => {
                trace!("dropping unparseable RTCP datagram: {}", e);
                if let Ok(mut guard) = inner.lock() {
                    guard.parse_failures += 1;
                }
                return;
            }
        };

        let Ok(mut guard) = inner.lock() else { return };
        for packet in &packets {
            match packet {
                RtcpPacket::SenderReport(sr) => {
                    guard.last_sr_ntp = Some(sr.ntp_timestamp);
                    guard.last_sr_arrival = Some(Instant::now());
                }
                RtcpPacket::Goodbye(bye) => {
                    debug!("received RTCP BYE from {:?}", bye.sources);
                }
                _ => {}
            }
        }
        guard.scheduler.record_packet(data.len());
        if let Some(callback) = guard.on_rtcp.as_mut() {
            callback(RtcpNotice::Compound(packets));
        }
    }

    fn handle_rtp(
        inner: &Arc<Mutex<SessionInner>>,
        codec: &Arc<dyn AudioCodec>,
        dtmf_payload_type: u8,
        data: &[u8],
    ) {
        let packet = match RtpPacket::parse(data) {
            Ok(packet) => packet,
            Err(e) => {
                trace!("dropping unparseable RTP datagram: {}", e);
                if let Ok(mut guard) = inner.lock() {
                    guard.parse_failures += 1;
                }
                return;
            }
        };

        let Ok(mut guard) = inner.lock() else { return };

        if packet.header.payload_type == dtmf_payload_type {
            if let Some((digit, duration)) = guard.dtmf_receiver.handle_packet(&packet) {
                if let Some(callback) = guard.on_dtmf.as_mut() {
                    callback(digit, duration);
                }
            }
            return;
        }

        let ssrc = packet.header.ssrc;
        if ssrc == guard.local_ssrc {
            // remote announced our identity: reroll ours and tell the user
            let old = guard.local_ssrc;
            let new = random_nonzero_ssrc();
            guard.local_ssrc = new;
            warn!(
                "SSRC collision with remote {:08x}, rerolled local SSRC to {:08x}",
                old, new
            );
            if let Some(callback) = guard.on_rtcp.as_mut() {
                callback(RtcpNotice::LocalSsrcChanged { old, new });
            }
        }

        match guard.remote_ssrc {
            None => {
                guard.remote_ssrc = Some(ssrc);
                guard.stream_stats = Some(StreamStatistics::new(codec.clock_rate()));
                debug!("latched remote SSRC {:08x}", ssrc);
            }
            Some(current) if current != ssrc => {
                debug!(
                    "remote SSRC changed {:08x} -> {:08x}, restarting receive state",
                    current, ssrc
                );
                guard.remote_ssrc = Some(ssrc);
                guard.jitter.flush();
                guard.stream_stats = Some(StreamStatistics::new(codec.clock_rate()));
            }
            _ => {}
        }

        guard.packets_received += 1;
        guard.octets_received += packet.payload.len() as u64;
        if let Some(stats) = guard.stream_stats.as_mut() {
            stats.add(&packet);
        }

        guard.jitter.add(JitterEntry::from_packet(&packet));
        loop {
            let frame = match guard.jitter.pop_ready() {
                Some(frame) => frame,
                None => break,
            };
            match codec.decode(&frame.payload) {
                Ok(pcm) => {
                    if let Some(callback) = guard.on_audio.as_mut() {
                        callback(pcm, frame.timestamp);
                    }
                }
                Err(e) => {
                    guard.decode_failures += 1;
                    warn!("failed to decode audio frame: {}", e);
                }
            }
        }
    }

    fn build_report(guard: &mut SessionInner, cname: &str) -> Result<Bytes> {
        let block = Self::report_block(guard);

        let first = if guard.sent_since_report {
            let mut sr = RtcpSenderReport::new(guard.local_ssrc);
            sr.rtp_timestamp = guard.timestamp;
            sr.sender_packet_count = guard.packets_sent;
            sr.sender_octet_count = guard.octets_sent;
            sr.report_blocks.extend(block);
            RtcpPacket::SenderReport(sr)
        } else {
            let mut rr = RtcpReceiverReport::new(guard.local_ssrc);
            rr.report_blocks.extend(block);
            RtcpPacket::ReceiverReport(rr)
        };
        guard.sent_since_report = false;

        let sdes = RtcpPacket::SourceDescription(RtcpSourceDescription::cname(
            guard.local_ssrc,
            cname.to_string(),
        ));

        RtcpPacket::serialize_compound(&[first, sdes])
    }

    fn report_block(guard: &mut SessionInner) -> Option<RtcpReportBlock> {
        let remote_ssrc = guard.remote_ssrc?;
        let last_sr = guard.last_sr_ntp.map_or(0, |ntp| ntp.to_compact());
        let delay_since_last_sr = guard
            .last_sr_arrival
            .map_or(0, |at| (at.elapsed().as_secs_f64() * 65536.0) as u32);

        let stats = guard.stream_stats.as_mut()?;
        Some(RtcpReportBlock {
            ssrc: remote_ssrc,
            fraction_lost: stats.fraction_lost(),
            cumulative_lost: stats.packets_lost(),
            highest_sequence: stats.extended_highest_sequence(),
            jitter: stats.jitter(),
            last_sr,
            delay_since_last_sr,
        })
    }
}

impl Drop for RtpSession {
    fn drop(&mut self) {
        // a session dropped without close() must not strand its tasks;
        // no BYE goes out on this path
        for slot in [&self.recv_task, &self.rtcp_task] {
            if let Ok(mut slot) = slot.lock() {
                if let Some(handle) = slot.take() {
                    handle.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn inner_for_test() -> SessionInner {
        SessionInner {
            state: SessionState::Active,
            local_ssrc: 0x35b9_70d2,
            sequence: 100,
            timestamp: 1000,
            packets_sent: 0,
            octets_sent: 0,
            sent_since_report: false,
            pending_sends: 0,
            remote_ssrc: None,
            jitter: JitterBuffer::new(16, 0),
            dtmf_receiver: DtmfReceiver::new(),
            stream_stats: None,
            packets_received: 0,
            octets_received: 0,
            parse_failures: 0,
            decode_failures: 0,
            last_sr_ntp: None,
            last_sr_arrival: None,
            scheduler: RtcpScheduler::new(3200, RTCP_MIN_INTERVAL),
            on_audio: None,
            on_dtmf: None,
            on_rtcp: None,
        }
    }

    #[test]
    fn test_report_is_rr_without_sends() {
        let mut inner = inner_for_test();
        let data = RtpSession::build_report(&mut inner, "cname@test").unwrap();
        let packets = RtcpPacket::parse_compound(&data).unwrap();
        assert!(matches!(packets[0], RtcpPacket::ReceiverReport(_)));
        assert!(matches!(packets[1], RtcpPacket::SourceDescription(_)));
    }

    #[test]
    fn test_report_is_sr_after_send_then_rr_again() {
        let mut inner = inner_for_test();
        inner.sent_since_report = true;
        inner.packets_sent = 5;
        inner.octets_sent = 800;

        let data = RtpSession::build_report(&mut inner, "cname@test").unwrap();
        let packets = RtcpPacket::parse_compound(&data).unwrap();
        match &packets[0] {
            RtcpPacket::SenderReport(sr) => {
                assert_eq!(sr.ssrc, 0x35b9_70d2);
                assert_eq!(sr.sender_packet_count, 5);
                assert_eq!(sr.sender_octet_count, 800);
            }
            other => panic!("expected SR, got {:?}", other),
        }

        // the sent flag is consumed by the report
        let data = RtpSession::build_report(&mut inner, "cname@test").unwrap();
        let packets = RtcpPacket::parse_compound(&data).unwrap();
        assert!(matches!(packets[0], RtcpPacket::ReceiverReport(_)));
    }

    #[test]
    fn test_report_block_reflects_remote_state() {
        let mut inner = inner_for_test();
        inner.remote_ssrc = Some(0x66aa_01c4);
        let mut stats = StreamStatistics::new(8000);
        for seq in 0u16..10 {
            stats.add(&RtpPacket::new_with_payload(
                0,
                seq,
                seq as u32 * 160,
                0x66aa_01c4,
                Bytes::new(),
            ));
        }
        inner.stream_stats = Some(stats);
        inner.last_sr_ntp = Some(NtpTimestamp { seconds: 0x0001_0002, fraction: 0x8000_0000 });
        inner.last_sr_arrival = Some(Instant::now());

        let block = RtpSession::report_block(&mut inner).unwrap();
        assert_eq!(block.ssrc, 0x66aa_01c4);
        assert_eq!(block.highest_sequence, 9);
        assert_eq!(block.cumulative_lost, 0);
        assert_eq!(block.last_sr, 0x0002_8000);
    }

    #[test]
    fn test_default_config() {
        let config = RtpSessionConfig::default();
        assert_eq!(config.jitter_capacity, 128);
        assert_eq!(config.jitter_prefetch, 3);
        assert_eq!(config.dtmf_payload_type, 101);
        assert_eq!(config.close_grace, Duration::from_millis(250));
        assert_eq!(config.rtcp_min_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_default_cname_shape() {
        let cname = default_cname();
        assert!(cname.starts_with("user@"));
        assert!(cname.len() > 5);
    }

    #[test]
    fn test_random_ssrc_nonzero() {
        for _ in 0..100 {
            assert_ne!(random_nonzero_ssrc(), 0);
        }
    }
}
