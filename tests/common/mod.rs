//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use control_router::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// In-memory duplex stream standing in for an accepted network connection.
///
/// The test side holds a [`TestPeer`]: frames pushed into `to_router` come
/// out of the router-facing `receive`, frames the router writes come out of
/// `from_router`. Closing (from either side) wakes a blocked `receive`.
pub struct TestConnection {
    inbox: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    outbox: mpsc::UnboundedSender<Vec<u8>>,
    closed: CancellationToken,
    close_observed: AtomicBool,
}

pub struct TestPeer {
    pub to_router: mpsc::UnboundedSender<Vec<u8>>,
    pub from_router: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl TestConnection {
    pub fn pair() -> (Arc<Self>, TestPeer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                inbox: Mutex::new(in_rx),
                outbox: out_tx,
                closed: CancellationToken::new(),
                close_observed: AtomicBool::new(false),
            }),
            TestPeer {
                to_router: in_tx,
                from_router: out_rx,
            },
        )
    }

    pub fn is_closed(&self) -> bool {
        self.close_observed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for TestConnection {
    async fn send(&self, payload: &[u8]) -> std::io::Result<()> {
        if self.closed.is_cancelled() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection closed",
            ));
        }
        self.outbox.send(payload.to_vec()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer dropped")
        })
    }

    async fn receive(&self) -> std::io::Result<Vec<u8>> {
        let mut inbox = self.inbox.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection closed",
            )),
            frame = inbox.recv() => frame.ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer disconnected")
            }),
        }
    }

    async fn close(&self) {
        self.close_observed.store(true, Ordering::SeqCst);
        self.closed.cancel();
    }
}

/// Polls `condition` until it holds, panicking after a generous deadline.
/// Works under both real and paused clocks.
pub async fn wait_until<F: Fn() -> bool>(condition: F, what: &str) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Receives the next frame the router wrote to a peer, with a deadline.
pub async fn recv_frame(from_router: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<u8> {
    tokio::time::timeout(Duration::from_secs(5), from_router.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("router side of the stream ended")
}

/// One-time tracing setup; safe to call from every test.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
