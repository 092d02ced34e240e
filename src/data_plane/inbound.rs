//! Per-connection reader: the connection lifecycle flow.

use crate::api::Handler;
use crate::connection::Connection;
use crate::control_plane::identity::ConnectionKey;
use crate::control_plane::registry::ConnectionRegistry;
use crate::observability::{events, fields};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

const COMPONENT: &str = "connection_reader";

/// One queued inbound payload plus its origin: the connection it was read
/// from and the handler bound to that connection.
pub(crate) struct InboundEnvelope {
    pub(crate) payload: Vec<u8>,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) connection: Arc<dyn Connection>,
}

/// Reads one connection until error or stop, handing each payload to the
/// control loop's queue.
///
/// Every live connection runs its own instance; instances are
/// unsynchronized with each other and rendezvous only at the shared inbound
/// queue. Exit always deregisters the connection and closes its stream.
pub(crate) struct ConnectionReader {
    flow_label: String,
    connection: Arc<dyn Connection>,
    handler: Arc<dyn Handler>,
    registry: Arc<ConnectionRegistry>,
    inbound: Sender<InboundEnvelope>,
    message_timeout: Option<Duration>,
    stop: CancellationToken,
}

impl ConnectionReader {
    pub(crate) fn new(
        connection: Arc<dyn Connection>,
        handler: Arc<dyn Handler>,
        registry: Arc<ConnectionRegistry>,
        inbound: Sender<InboundEnvelope>,
        message_timeout: Option<Duration>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            flow_label: Uuid::new_v4().to_string(),
            connection,
            handler,
            registry,
            inbound,
            message_timeout,
            stop,
        }
    }

    pub(crate) async fn run(self) {
        loop {
            let read = tokio::select! {
                _ = self.stop.cancelled() => break,
                read = self.connection.receive() => read,
            };
            match read {
                Ok(payload) => {
                    debug!(
                        event = events::INBOUND_RECEIVE,
                        component = COMPONENT,
                        flow = %self.flow_label,
                        payload = %fields::format_payload(&payload),
                        "read inbound payload"
                    );
                    if !self.forward(payload).await {
                        break;
                    }
                }
                Err(err) => {
                    warn!(
                        event = events::INBOUND_READ_FAILED,
                        component = COMPONENT,
                        flow = %self.flow_label,
                        err = %err,
                        "read failed"
                    );
                    break;
                }
            }
        }

        self.registry
            .remove(&ConnectionKey::new(self.connection.clone()))
            .await;
        self.connection.close().await;
        debug!(
            event = events::INBOUND_CLOSED,
            component = COMPONENT,
            flow = %self.flow_label,
            "closing connection"
        );
    }

    /// Hands one payload to the control loop. Returns `false` when the
    /// reader should exit: stop signalled, or the control loop gone.
    async fn forward(&self, payload: Vec<u8>) -> bool {
        let envelope = InboundEnvelope {
            payload,
            handler: self.handler.clone(),
            connection: self.connection.clone(),
        };
        match self.message_timeout {
            Some(timeout) => {
                tokio::select! {
                    _ = self.stop.cancelled() => false,
                    sent = self.inbound.send_timeout(envelope, timeout) => match sent {
                        Ok(()) => true,
                        Err(SendTimeoutError::Timeout(dropped)) => {
                            // Silent towards the sender: logged, no retry.
                            debug!(
                                event = events::INBOUND_DROP_TIMEOUT,
                                component = COMPONENT,
                                flow = %self.flow_label,
                                payload = %fields::format_payload(&dropped.payload),
                                "control loop busy past the message timeout, dropping"
                            );
                            true
                        }
                        Err(SendTimeoutError::Closed(_)) => false,
                    },
                }
            }
            None => {
                tokio::select! {
                    _ = self.stop.cancelled() => false,
                    sent = self.inbound.send(envelope) => sent.is_ok(),
                }
            }
        }
    }
}
