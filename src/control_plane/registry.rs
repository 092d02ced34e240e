//! Live-connection registry: the system's only shared mutable table.

use crate::api::Handler;
use crate::connection::Connection;
use crate::control_plane::identity::{ConnectionKey, HandlerKey};
use crate::error::RouterError;
use crate::routing::resolution::select_targets;
use crate::routing::scope::Scope;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const REGISTRY_TAG: &str = "ConnectionRegistry:";
const REGISTRY_FN_ADD_TAG: &str = "add():";
const REGISTRY_FN_REMOVE_TAG: &str = "remove():";
const REGISTRY_FN_BEGIN_DRAIN_TAG: &str = "begin_drain():";

struct RegistryInner {
    /// Connection -> bound handler; the binding is fixed for the
    /// connection's registered lifetime.
    entries: HashMap<ConnectionKey, Arc<dyn Handler>>,
    /// Set once by shutdown; excludes all further registration.
    draining: bool,
}

/// Owns the live set of connections behind a short-held lock.
///
/// The table itself never leaks: callers go through `add`/`remove`/
/// `resolve`/`begin_drain`, each a single short critical section, and the
/// lock is never held across a user callback.
pub(crate) struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
}

impl ConnectionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                entries: HashMap::new(),
                draining: false,
            }),
        }
    }

    /// Registers a new live connection, atomically checked against the
    /// shutdown flag. Fails only once shutdown has started.
    pub(crate) async fn add(
        &self,
        connection: Arc<dyn Connection>,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RouterError> {
        let mut inner = self.inner.lock().await;
        if inner.draining {
            warn!("{REGISTRY_TAG}:{REGISTRY_FN_ADD_TAG} rejecting connection, shutdown started");
            return Err(RouterError::ShuttingDown);
        }
        inner
            .entries
            .insert(ConnectionKey::new(connection), handler);
        debug!(
            "{REGISTRY_TAG}:{REGISTRY_FN_ADD_TAG} registered, {} live",
            inner.entries.len()
        );
        Ok(())
    }

    /// Deregisters a connection. Idempotent: returns whether an entry was
    /// actually removed.
    pub(crate) async fn remove(&self, key: &ConnectionKey) -> bool {
        let mut inner = self.inner.lock().await;
        let removed = inner.entries.remove(key).is_some();
        if removed {
            debug!(
                "{REGISTRY_TAG}:{REGISTRY_FN_REMOVE_TAG} deregistered, {} live",
                inner.entries.len()
            );
        }
        removed
    }

    /// Resolves a fan-out scope to the matching live connections.
    ///
    /// Returns clones of the matching `Arc`s so the caller writes with the
    /// lock released.
    pub(crate) async fn resolve(
        &self,
        scope: Scope,
        handler: Option<&HandlerKey>,
        connection: Option<&ConnectionKey>,
    ) -> Vec<Arc<dyn Connection>> {
        let inner = self.inner.lock().await;
        select_targets(inner.entries.iter(), scope, handler, connection)
    }

    /// First shutdown step: under one lock acquisition, refuse all further
    /// registration and clear the table, handing the drained connections
    /// back for the sequencer to close.
    pub(crate) async fn begin_drain(&self) -> Vec<Arc<dyn Connection>> {
        let mut inner = self.inner.lock().await;
        inner.draining = true;
        let drained: Vec<Arc<dyn Connection>> = inner
            .entries
            .drain()
            .map(|(key, _)| key.connection().clone())
            .collect();
        debug!(
            "{REGISTRY_TAG}:{REGISTRY_FN_BEGIN_DRAIN_TAG} drained {} connections",
            drained.len()
        );
        drained
    }

    /// Number of live connections.
    pub(crate) async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}
