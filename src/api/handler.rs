//! The per-subsystem handler contract.

use crate::transmitter::Transmitter;
use async_trait::async_trait;

/// User-supplied logic for one logical subsystem.
///
/// A handler is registered under a name at construction and bound to every
/// connection mounted through that name's [`Endpoint`](crate::Endpoint).
/// Whether a message is acted on here or in
/// [`Commander::message`](crate::Commander::message) is the implementor's
/// choice; the router invokes both, commander first.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Called on every update tick. `tr` has ceiling
    /// [`Scope::Handler`](crate::Scope::Handler), bound to this handler.
    async fn update(&self, tr: Transmitter);

    /// Called for each message read off a connection bound to this handler.
    /// `tr` has ceiling [`Scope::Connection`](crate::Scope::Connection),
    /// bound to this handler and the originating connection.
    async fn message(&self, payload: &[u8], tr: Transmitter);
}
