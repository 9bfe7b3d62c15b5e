//! Even/odd port-pair allocation for RTP/RTCP
//!
//! Telephony peers that keep RTCP on its own socket expect an even RTP
//! port with RTCP on the next odd one. The allocator probes pairs in a
//! configured range and hands out the first pair that binds.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::error::Error;
use crate::Result;

/// Hands out even/odd UDP port pairs from a fixed range
pub struct PortAllocator {
    min_port: u16,
    max_port: u16,
    allocated: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    /// Create an allocator over `[min_port, max_port)`.
    ///
    /// An odd lower bound is rounded up so RTP ports stay even.
    pub fn new(min_port: u16, max_port: u16) -> Self {
        Self {
            min_port: min_port + (min_port % 2),
            max_port,
            allocated: Mutex::new(HashSet::new()),
        }
    }

    /// Allocate a bindable `(rtp_port, rtcp_port)` pair
    pub async fn allocate(&self) -> Result<(u16, u16)> {
        let mut allocated = self.allocated.lock().await;

        for port in (self.min_port..self.max_port).step_by(2) {
            if allocated.contains(&port) {
                continue;
            }
            if Self::pair_binds(port).await {
                allocated.insert(port);
                return Ok((port, port + 1));
            }
        }
        Err(Error::Transport(
            "no available port pair in range".to_string(),
        ))
    }

    /// Return a previously allocated pair
    pub async fn release(&self, rtp_port: u16) {
        self.allocated.lock().await.remove(&rtp_port);
    }

    async fn pair_binds(port: u16) -> bool {
        let any = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        let rtp = UdpSocket::bind(SocketAddr::new(any, port)).await;
        let rtcp = UdpSocket::bind(SocketAddr::new(any, port + 1)).await;
        rtp.is_ok() && rtcp.is_ok()
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(10_000, 20_000)
    }
}
