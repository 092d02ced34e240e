//! The system-wide command contract.

use crate::api::Handler;
use crate::error::StartError;
use crate::transmitter::Transmitter;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// User-supplied logic governing the whole system.
///
/// Exactly one commander exists per [`Router`](crate::Router). It sees every
/// inbound message before the owning handler does, drives periodic updates,
/// and is guaranteed a final [`stop`](Commander::stop) call (during shutdown,
/// or after a callback fault) as the last callback the system makes.
#[async_trait]
pub trait Commander: Send + Sync {
    /// Called once during construction, before any background flow is
    /// spawned.
    ///
    /// `transmitters` holds one handler-ceiling transmitter per registered
    /// name; the bound handler can be recovered via
    /// [`Transmitter::handler`]. Returning an `Err` aborts construction
    /// entirely.
    async fn start(&self, transmitters: HashMap<String, Transmitter>) -> Result<(), StartError>;

    /// Called exactly once as the control loop's last act.
    ///
    /// The outbound dispatcher outlives the control loop by one shutdown
    /// step, so sends issued from here are still accepted and dispatched
    /// against whatever connections remain registered.
    async fn stop(&self);

    /// Period of the update tick. `None` (or a zero duration) disables
    /// periodic updates. Read once after [`start`](Commander::start)
    /// succeeds and frozen for the router's lifetime.
    fn update_frequency(&self) -> Option<Duration>;

    /// How long an inbound hand-off may wait for the control loop before
    /// the message is silently dropped. `None` means hand-offs block
    /// indefinitely and nothing is ever dropped. Read once and frozen,
    /// like [`update_frequency`](Commander::update_frequency).
    fn message_timeout(&self) -> Option<Duration>;

    /// Called on every update tick, before the per-handler updates.
    /// `tr` has ceiling [`Scope::Broadcast`](crate::Scope::Broadcast).
    async fn update(&self, tr: Transmitter);

    /// Called for every inbound message, before `origin`'s own
    /// [`Handler::message`]. `tr` has ceiling
    /// [`Scope::Connection`](crate::Scope::Connection), bound to the
    /// originating handler and connection.
    async fn message(&self, payload: &[u8], origin: Arc<dyn Handler>, tr: Transmitter);
}
