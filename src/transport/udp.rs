//! UDP transport for RTP/RTCP

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use super::DatagramChannel;
use crate::error::Error;
use crate::Result;

/// Datagram channel backed by a tokio UDP socket
pub struct UdpChannel {
    socket: UdpSocket,
}

impl UdpChannel {
    /// Bind a new UDP channel
    pub async fn bind(local_addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local_addr)
            .await
            .map_err(|e| Error::Transport(format!("failed to bind UDP socket: {}", e)))?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl DatagramChannel for UdpChannel {
    fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| Error::Transport(format!("failed to get local address: {}", e)))
    }

    async fn send_to(&self, data: &[u8], dest: SocketAddr) -> Result<usize> {
        self.socket
            .send_to(data, dest)
            .await
            .map_err(|e| Error::Transport(format!("failed to send datagram: {}", e)))
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await.map_err(Error::from)
    }

    async fn close(&self) -> Result<()> {
        // UDP sockets release on drop
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_and_local_addr() {
        let channel = UdpChannel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = channel.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_datagram_roundtrip() {
        let a = UdpChannel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = UdpChannel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let sent = a
            .send_to(b"hello rtp", b.local_addr().unwrap())
            .await
            .unwrap();
        assert_eq!(sent, 9);

        let mut buf = [0u8; 64];
        let (len, from) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"hello rtp");
        assert_eq!(from, a.local_addr().unwrap());
    }
}
