//! Per-name mount point handed to the external transport layer.

use crate::api::Handler;
use crate::connection::Connection;
use crate::control_plane::registry::ConnectionRegistry;
use crate::data_plane::inbound::{ConnectionReader, InboundEnvelope};
use crate::error::RouterError;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const ENDPOINT_TAG: &str = "Endpoint:";
const ENDPOINT_FN_ATTACH_TAG: &str = "attach():";

/// The connect entry point for one registered name.
///
/// The external listener performs accept/handshake, then mounts the
/// established stream here; every connection attached through an endpoint
/// is bound to that endpoint's handler for its whole lifetime. Cloneable so
/// the transport layer can hold one per listener.
#[derive(Clone)]
pub struct Endpoint {
    name: String,
    handler: Arc<dyn Handler>,
    registry: Arc<ConnectionRegistry>,
    inbound: Sender<InboundEnvelope>,
    message_timeout: Option<Duration>,
    reader_stop: CancellationToken,
    readers: Arc<Mutex<JoinSet<()>>>,
}

impl Endpoint {
    pub(crate) fn new(
        name: &str,
        handler: Arc<dyn Handler>,
        registry: Arc<ConnectionRegistry>,
        inbound: Sender<InboundEnvelope>,
        message_timeout: Option<Duration>,
        reader_stop: CancellationToken,
        readers: Arc<Mutex<JoinSet<()>>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            handler,
            registry,
            inbound,
            message_timeout,
            reader_stop,
            readers,
        }
    }

    /// The registered name this endpoint mounts connections for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers `connection` and spawns its reader flow.
    ///
    /// Check-and-register is atomic against the shutdown flag: once
    /// shutdown has started this fails with
    /// [`RouterError::ShuttingDown`] and the stream is untouched. The
    /// spawn happens under the same tracking lock the shutdown sequencer
    /// joins under, so an accepted connection is always waited on during
    /// teardown.
    pub async fn attach(&self, connection: Arc<dyn Connection>) -> Result<(), RouterError> {
        let mut readers = self.readers.lock().await;
        self.registry
            .add(connection.clone(), self.handler.clone())
            .await?;

        let reader = ConnectionReader::new(
            connection,
            self.handler.clone(),
            self.registry.clone(),
            self.inbound.clone(),
            self.message_timeout,
            self.reader_stop.clone(),
        );
        readers.spawn(reader.run());
        debug!(
            "{ENDPOINT_TAG}:{ENDPOINT_FN_ATTACH_TAG} mounted connection on {:?}",
            self.name
        );
        Ok(())
    }
}

impl Debug for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
