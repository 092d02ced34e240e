//! Scope-capped send handle issued to user callbacks.

use crate::api::Handler;
use crate::connection::Connection;
use crate::data_plane::outbound::OutboundEnvelope;
use crate::routing::scope::Scope;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tokio::sync::mpsc::Sender;

/// A capability to emit outbound payloads, capped at a ceiling scope.
///
/// Transmitters are constructed only by the router, with a ceiling fitted to
/// the call site that receives them; callers can narrow a send below the
/// ceiling but never widen it. The handle is immutable and cheap to clone:
/// a callback may stash one, and the commander keeps the handler-ceiling set
/// it was given at start for the router's whole lifetime.
#[derive(Clone)]
pub struct Transmitter {
    ceiling: Scope,
    handler: Option<Arc<dyn Handler>>,
    connection: Option<Arc<dyn Connection>>,
    outbound: Option<Sender<OutboundEnvelope>>,
}

impl Transmitter {
    /// Broadcast-only transmitter, for commander updates.
    pub(crate) fn broadcast(outbound: Sender<OutboundEnvelope>) -> Self {
        Self {
            ceiling: Scope::Broadcast,
            handler: None,
            connection: None,
            outbound: Some(outbound),
        }
    }

    /// Handler-ceiling transmitter bound to `handler`, for the start map and
    /// per-handler updates.
    pub(crate) fn for_handler(
        handler: Arc<dyn Handler>,
        outbound: Sender<OutboundEnvelope>,
    ) -> Self {
        Self {
            ceiling: Scope::Handler,
            handler: Some(handler),
            connection: None,
            outbound: Some(outbound),
        }
    }

    /// Full-ceiling transmitter bound to the originating handler and
    /// connection, for message deliveries.
    pub(crate) fn for_connection(
        handler: Arc<dyn Handler>,
        connection: Arc<dyn Connection>,
        outbound: Sender<OutboundEnvelope>,
    ) -> Self {
        Self {
            ceiling: Scope::Connection,
            handler: Some(handler),
            connection: Some(connection),
            outbound: Some(outbound),
        }
    }

    /// A transmitter with no outbound path; every send fails.
    #[cfg(test)]
    pub(crate) fn detached(ceiling: Scope) -> Self {
        Self {
            ceiling,
            handler: None,
            connection: None,
            outbound: None,
        }
    }

    /// Enqueues `payload` for fan-out at `scope`.
    ///
    /// Returns `false` with no side effect if `scope` exceeds this
    /// transmitter's ceiling or no outbound path is bound. Otherwise waits
    /// for queue capacity (backpressure on the calling callback) and returns
    /// `true` once the payload is accepted. Acceptance, not delivery:
    /// per-connection write failures are the dispatcher's to log.
    pub async fn send(&self, payload: &[u8], scope: Scope) -> bool {
        if !self.ceiling.allows(scope) {
            return false;
        }
        let Some(outbound) = &self.outbound else {
            return false;
        };
        let envelope = OutboundEnvelope {
            payload: payload.to_vec(),
            scope,
            handler: self.handler.clone(),
            connection: self.connection.clone(),
        };
        outbound.send(envelope).await.is_ok()
    }

    /// The scopes this transmitter may emit at, in ascending order.
    pub fn allowed_scopes(&self) -> &'static [Scope] {
        self.ceiling.allowed()
    }

    /// This transmitter's ceiling.
    pub fn ceiling(&self) -> Scope {
        self.ceiling
    }

    /// The handler this transmitter is bound to, if any.
    pub fn handler(&self) -> Option<Arc<dyn Handler>> {
        self.handler.clone()
    }
}

impl Debug for Transmitter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transmitter")
            .field("ceiling", &self.ceiling)
            .field("bound_handler", &self.handler.is_some())
            .field("bound_connection", &self.connection.is_some())
            .finish_non_exhaustive()
    }
}
