//! Ordered teardown of readers, control loop, and dispatcher.

use crate::control_plane::registry::ConnectionRegistry;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const SHUTDOWN_TAG: &str = "ShutdownSequencer:";
const SHUTDOWN_FN_RUN_TAG: &str = "run():";

/// One-shot teardown, built at router construction and consumed by the
/// first (and only) `Router::shutdown` call.
///
/// The step order is the contract: connections first, then readers, then
/// the control loop, then the outbound dispatcher. No `Message`/`Update`
/// callback is possible once the commander's stop begins, and the outbound
/// path stays alive through the stop callback so its sends still go out.
pub(crate) struct ShutdownSequencer {
    registry: Arc<ConnectionRegistry>,
    reader_stop: CancellationToken,
    readers: Arc<Mutex<JoinSet<()>>>,
    control_stop: CancellationToken,
    control_loop: JoinHandle<()>,
    dispatch_stop: CancellationToken,
    dispatcher: JoinHandle<()>,
}

impl ShutdownSequencer {
    pub(crate) fn new(
        registry: Arc<ConnectionRegistry>,
        reader_stop: CancellationToken,
        readers: Arc<Mutex<JoinSet<()>>>,
        control_stop: CancellationToken,
        control_loop: JoinHandle<()>,
        dispatch_stop: CancellationToken,
        dispatcher: JoinHandle<()>,
    ) -> Self {
        Self {
            registry,
            reader_stop,
            readers,
            control_stop,
            control_loop,
            dispatch_stop,
            dispatcher,
        }
    }

    pub(crate) async fn run(self) {
        // 1. Refuse new connections, then force every reader off its
        // stream. The registry flag flips and the table clears under one
        // lock; the closes run right after, against streams no longer
        // reachable through the registry.
        let drained = self.registry.begin_drain().await;
        debug!(
            "{SHUTDOWN_TAG}:{SHUTDOWN_FN_RUN_TAG} closing {} connections",
            drained.len()
        );
        for connection in drained {
            connection.close().await;
        }
        self.reader_stop.cancel();

        // 2. Wait for every reader flow to finish. Attaches racing this
        // lock lose to the drain flag above.
        let mut readers = self.readers.lock().await;
        while readers.join_next().await.is_some() {}
        drop(readers);
        debug!("{SHUTDOWN_TAG}:{SHUTDOWN_FN_RUN_TAG} all readers finished");

        // 3. Stop the control loop. Commander::stop runs inside it before
        // the task completes, so no further callback is observable past
        // this await.
        self.control_stop.cancel();
        if let Err(err) = self.control_loop.await {
            error!("{SHUTDOWN_TAG}:{SHUTDOWN_FN_RUN_TAG} control loop task failed: {err}");
        }

        // 4. Outbound path last; the dispatcher drains what the stop
        // callback enqueued before exiting.
        self.dispatch_stop.cancel();
        if let Err(err) = self.dispatcher.await {
            error!("{SHUTDOWN_TAG}:{SHUTDOWN_FN_RUN_TAG} dispatcher task failed: {err}");
        }
        debug!("{SHUTDOWN_TAG}:{SHUTDOWN_FN_RUN_TAG} teardown complete");
    }
}
