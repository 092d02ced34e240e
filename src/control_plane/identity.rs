//! Pointer-identity keys for trait-object connections and handlers.

use crate::api::Handler;
use crate::connection::Connection;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Registry key for one live connection.
///
/// Identity is the `Arc` allocation, not the peer behind it: the same stream
/// handed in twice would be two distinct connections only if wrapped in two
/// distinct `Arc`s, which the attach contract forbids.
#[derive(Clone)]
pub(crate) struct ConnectionKey {
    connection: Arc<dyn Connection>,
}

impl ConnectionKey {
    pub(crate) fn new(connection: Arc<dyn Connection>) -> Self {
        Self { connection }
    }

    pub(crate) fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }
}

impl Hash for ConnectionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.connection).hash(state);
    }
}

impl PartialEq for ConnectionKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.connection, &other.connection)
    }
}

impl Eq for ConnectionKey {}

impl Debug for ConnectionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionKey").finish_non_exhaustive()
    }
}

/// Identity of one user handler instance, for handler-scoped fan-out.
#[derive(Clone)]
pub(crate) struct HandlerKey {
    handler: Arc<dyn Handler>,
}

impl HandlerKey {
    pub(crate) fn new(handler: Arc<dyn Handler>) -> Self {
        Self { handler }
    }

    /// Whether `handler` is the instance this key names.
    pub(crate) fn matches(&self, handler: &Arc<dyn Handler>) -> bool {
        Arc::ptr_eq(&self.handler, handler)
    }
}

impl Hash for HandlerKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.handler).hash(state);
    }
}

impl PartialEq for HandlerKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.handler, &other.handler)
    }
}

impl Eq for HandlerKey {}

impl Debug for HandlerKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerKey").finish_non_exhaustive()
    }
}
