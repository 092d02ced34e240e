//! Public error surface of the router.

use thiserror::Error;

/// Error type user [`Commander::start`](crate::Commander::start) implementations
/// may return to abort construction.
pub type StartError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by [`Router`](crate::Router) construction and connection mounting.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The commander rejected startup; nothing was spawned.
    #[error("commander start failed: {0}")]
    Start(StartError),
    /// Shutdown has already begun; new connections are refused.
    #[error("router is shutting down, connection rejected")]
    ShuttingDown,
}
