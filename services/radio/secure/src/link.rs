//! Radio link seam.
//!
//! Links move whole frames; preamble and sync words are handled below this
//! interface.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use tokio::sync::{mpsc, Mutex};

/// A carrier that delivers and accepts complete frames
#[async_trait]
pub trait RadioLink: Send + Sync {
    /// Next received frame; `None` once the link is closed
    async fn receive_bytes(&self) -> io::Result<Option<Bytes>>;

    /// Transmit one frame
    async fn send_bytes(&self, frame: Bytes) -> io::Result<()>;
}

/// In-process link pair, for tests and local wiring
#[derive(Debug)]
pub struct LoopbackLink {
    tx: mpsc::Sender<Bytes>,
    rx: Mutex<mpsc::Receiver<Bytes>>,
}

impl LoopbackLink {
    /// Two connected ends, each buffering up to `capacity` frames
    pub fn pair(capacity: usize) -> (LoopbackLink, LoopbackLink) {
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        (
            LoopbackLink {
                tx: a_tx,
                rx: Mutex::new(a_rx),
            },
            LoopbackLink {
                tx: b_tx,
                rx: Mutex::new(b_rx),
            },
        )
    }
}

#[async_trait]
impl RadioLink for LoopbackLink {
    async fn receive_bytes(&self) -> io::Result<Option<Bytes>> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn send_bytes(&self, frame: Bytes) -> io::Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer link closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_pair() {
        let (a, b) = LoopbackLink::pair(4);
        a.send_bytes(Bytes::from_static(b"\x04\x4f\x00\x00\x01")).await.unwrap();
        b.send_bytes(Bytes::from_static(b"reply")).await.unwrap();

        assert_eq!(&b.receive_bytes().await.unwrap().unwrap()[..], b"\x04\x4f\x00\x00\x01");
        assert_eq!(&a.receive_bytes().await.unwrap().unwrap()[..], b"reply");

        drop(a);
        assert!(b.receive_bytes().await.unwrap().is_none());
        assert!(b.send_bytes(Bytes::new()).await.is_err());
    }
}
