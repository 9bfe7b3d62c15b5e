//! Network transport for RTP/RTCP
//!
//! The session consumes an abstract datagram channel; any socket-like
//! object that can bind, send to and receive from UDP peers may back it.
//! RTP and RTCP share one channel and are told apart by the payload-type
//! range check in [`crate::packet::is_rtcp`].

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::Result;

/// A UDP-like datagram endpoint
#[async_trait]
pub trait DatagramChannel: Send + Sync {
    /// The locally bound address
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Send one datagram to a destination
    async fn send_to(&self, data: &[u8], dest: SocketAddr) -> Result<usize>;

    /// Receive one datagram, returning its length and origin
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)>;

    /// Release the endpoint
    async fn close(&self) -> Result<()>;
}

// Re-export submodules
pub mod alloc;
pub mod udp;

pub use alloc::PortAllocator;
pub use udp::UdpChannel;
