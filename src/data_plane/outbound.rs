//! Outbound dispatcher: sole consumer of the outbound queue.

use crate::api::Handler;
use crate::connection::Connection;
use crate::control_plane::identity::{ConnectionKey, HandlerKey};
use crate::control_plane::registry::ConnectionRegistry;
use crate::observability::{events, fields};
use crate::routing::scope::Scope;
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

const COMPONENT: &str = "outbound_dispatcher";

/// One queued outbound payload plus the authorization context it was issued
/// under. The optional bindings come from the issuing transmitter and are
/// what scope resolution matches against.
pub(crate) struct OutboundEnvelope {
    pub(crate) payload: Vec<u8>,
    pub(crate) scope: Scope,
    pub(crate) handler: Option<Arc<dyn Handler>>,
    pub(crate) connection: Option<Arc<dyn Connection>>,
}

/// Drains the outbound queue, resolving each envelope's scope against the
/// registry and writing to every match.
///
/// Runs as its own task for the router's lifetime. A write failure is
/// logged and skipped: the failing connection's reader observes the broken
/// stream on its own and deregisters it.
pub(crate) struct OutboundDispatcher {
    flow_label: String,
    registry: Arc<ConnectionRegistry>,
    outbound: Receiver<OutboundEnvelope>,
    stop: CancellationToken,
}

impl OutboundDispatcher {
    pub(crate) fn new(
        registry: Arc<ConnectionRegistry>,
        outbound: Receiver<OutboundEnvelope>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            flow_label: Uuid::new_v4().to_string(),
            registry,
            outbound,
            stop,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let envelope = tokio::select! {
                _ = self.stop.cancelled() => break,
                envelope = self.outbound.recv() => envelope,
            };
            match envelope {
                Some(envelope) => self.dispatch(envelope).await,
                None => break,
            }
        }
        // The stop signal arrives one shutdown step after the control loop
        // completes, so everything Commander::stop enqueued is already in
        // the queue: deliver it before exiting.
        while let Ok(envelope) = self.outbound.try_recv() {
            self.dispatch(envelope).await;
        }
        debug!(
            event = events::OUTBOUND_STOPPED,
            component = COMPONENT,
            flow = %self.flow_label,
            "outbound dispatcher stopped"
        );
    }

    async fn dispatch(&self, envelope: OutboundEnvelope) {
        let handler_key = envelope
            .handler
            .as_ref()
            .map(|handler| HandlerKey::new(handler.clone()));
        let connection_key = envelope
            .connection
            .as_ref()
            .map(|connection| ConnectionKey::new(connection.clone()));

        let targets = self
            .registry
            .resolve(envelope.scope, handler_key.as_ref(), connection_key.as_ref())
            .await;

        debug!(
            event = events::OUTBOUND_DISPATCH,
            component = COMPONENT,
            flow = %self.flow_label,
            scope = envelope.scope.label(),
            targets = targets.len(),
            payload = %fields::format_payload(&envelope.payload),
            "dispatching envelope"
        );

        for target in targets {
            if let Err(err) = target.send(&envelope.payload).await {
                warn!(
                    event = events::OUTBOUND_WRITE_FAILED,
                    component = COMPONENT,
                    flow = %self.flow_label,
                    err = %err,
                    "write failed, leaving the connection to its own reader"
                );
            }
        }
    }
}
