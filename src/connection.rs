//! Transport seam: the byte-stream contract handed in per accepted connection.

use async_trait::async_trait;

/// One established bidirectional byte stream.
///
/// The accept/handshake mechanism lives outside this crate; an external
/// listener performs the upgrade and hands the finished stream to
/// [`Endpoint::attach`](crate::Endpoint::attach) as an `Arc<dyn Connection>`.
/// Payloads are opaque to the router; framing is the transport's concern.
///
/// `close` must be idempotent: the router closes a stream both from the
/// connection's own reader and, during shutdown, from the sequencer.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Writes one payload to the peer.
    async fn send(&self, payload: &[u8]) -> std::io::Result<()>;

    /// Reads the next payload from the peer.
    ///
    /// An `Err` ends the connection's lifecycle: the reader deregisters it
    /// and closes the stream.
    async fn receive(&self) -> std::io::Result<Vec<u8>>;

    /// Closes the underlying stream. Pending `receive` calls must observe an error.
    async fn close(&self);
}
