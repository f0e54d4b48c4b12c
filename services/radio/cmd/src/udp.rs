//! UDP stand-in for a radio modem: one datagram per frame.

use async_trait::async_trait;
use bytes::Bytes;
use radio_secure::RadioLink;
use radio_wire::MAX_FRAME_LEN;
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::trace;

/// Radio link over a UDP socket
#[derive(Debug)]
pub struct UdpLink {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
}

impl UdpLink {
    /// Bind to `bind`; frames are sent to `peer` if given
    pub async fn bind(bind: SocketAddr, peer: Option<SocketAddr>) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind).await?;
        Ok(Self { socket, peer })
    }

    /// Local address
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait]
impl RadioLink for UdpLink {
    async fn receive_bytes(&self) -> io::Result<Option<Bytes>> {
        // One spare byte so an oversized datagram is seen as such, not truncated to fit.
        let mut buf = [0u8; MAX_FRAME_LEN as usize + 2];
        let (n, from) = self.socket.recv_from(&mut buf).await?;
        trace!(len = n, %from, "datagram received");
        Ok(Some(Bytes::copy_from_slice(&buf[..n])))
    }

    async fn send_bytes(&self, frame: Bytes) -> io::Result<()> {
        let peer = self
            .peer
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no peer address"))?;
        self.socket.send_to(&frame, peer).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_link_roundtrip() {
        let localhost: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let rx = UdpLink::bind(localhost, None).await.unwrap();
        let tx = UdpLink::bind(localhost, Some(rx.local_addr().unwrap()))
            .await
            .unwrap();

        let frame = Bytes::from(hex::decode("084f02808102000123").unwrap());
        tx.send_bytes(frame.clone()).await.unwrap();
        assert_eq!(rx.receive_bytes().await.unwrap(), Some(frame));

        assert!(rx.send_bytes(Bytes::new()).await.is_err());
    }
}
