//! Pure fan-out target selection over registry entries.

use crate::api::Handler;
use crate::connection::Connection;
use crate::control_plane::identity::{ConnectionKey, HandlerKey};
use crate::routing::scope::Scope;
use std::sync::Arc;
use tracing::warn;

const COMPONENT: &str = "resolution";

/// Selects the connections an envelope at `scope` is written to.
///
/// `handler`/`connection` carry the issuing transmitter's bindings. A
/// handler- or connection-scoped envelope with no matching live entry
/// selects nothing; the missing-binding cases cannot be produced through
/// the public API, but are policy here rather than panics so a stale
/// envelope can never take down the dispatcher.
pub(crate) fn select_targets<'a, I>(
    entries: I,
    scope: Scope,
    handler: Option<&HandlerKey>,
    connection: Option<&ConnectionKey>,
) -> Vec<Arc<dyn Connection>>
where
    I: Iterator<Item = (&'a ConnectionKey, &'a Arc<dyn Handler>)>,
{
    match scope {
        Scope::Broadcast => entries.map(|(key, _)| key.connection().clone()).collect(),
        Scope::Handler => {
            let Some(handler) = handler else {
                warn!(component = COMPONENT, "handler-scoped envelope without a bound handler");
                return Vec::new();
            };
            entries
                .filter(|(_, bound)| handler.matches(*bound))
                .map(|(key, _)| key.connection().clone())
                .collect()
        }
        Scope::Connection => {
            let Some(connection) = connection else {
                warn!(component = COMPONENT, "connection-scoped envelope without a bound connection");
                return Vec::new();
            };
            entries
                .filter(|(key, _)| *key == connection)
                .map(|(key, _)| key.connection().clone())
                .collect()
        }
    }
}
