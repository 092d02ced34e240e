/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! # control-router
//!
//! `control-router` lets many independent, long-lived connections drive one
//! shared piece of control logic without that logic needing any locking of
//! its own. Inbound messages and periodic updates are funneled through a
//! single control loop that invokes user callbacks strictly one sequence at
//! a time; replies fan back out through scope-capped [`Transmitter`]s.
//!
//! Typical usage is API-first and remains centered on [`Router`],
//! [`Endpoint`], and the two capability contracts [`Commander`] and
//! [`Handler`]. Internal modules are organized by domain layer to keep
//! behavior ownership explicit.
//!
//! ## Quick start
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use control_router::{Commander, Handler, Router, Scope, StartError, Transmitter};
//!
//! struct Motors;
//!
//! #[async_trait]
//! impl Handler for Motors {
//!     async fn update(&self, _tr: Transmitter) {}
//!
//!     async fn message(&self, payload: &[u8], tr: Transmitter) {
//!         // Echo to the originating connection only.
//!         tr.send(payload, Scope::Connection).await;
//!     }
//! }
//!
//! struct Supervisor;
//!
//! #[async_trait]
//! impl Commander for Supervisor {
//!     async fn start(
//!         &self,
//!         _transmitters: HashMap<String, Transmitter>,
//!     ) -> Result<(), StartError> {
//!         Ok(())
//!     }
//!
//!     async fn stop(&self) {}
//!
//!     fn update_frequency(&self) -> Option<Duration> {
//!         None // no periodic updates
//!     }
//!
//!     fn message_timeout(&self) -> Option<Duration> {
//!         Some(Duration::from_millis(100))
//!     }
//!
//!     async fn update(&self, _tr: Transmitter) {}
//!
//!     async fn message(&self, _payload: &[u8], _origin: Arc<dyn Handler>, _tr: Transmitter) {}
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let handlers: HashMap<String, Arc<dyn Handler>> =
//!     HashMap::from([("motors".to_string(), Arc::new(Motors) as Arc<dyn Handler>)]);
//!
//! let router = Router::new("quick-start", 16, Arc::new(Supervisor), handlers)
//!     .await
//!     .unwrap();
//!
//! // The external listener mounts each accepted stream through the
//! // matching endpoint: `endpoint.attach(connection)`.
//! let endpoint = router.endpoint("motors").unwrap();
//! assert_eq!(endpoint.name(), "motors");
//!
//! router.shutdown().await;
//! # });
//! ```
//!
//! ## Serialization contract
//!
//! At most one callback sequence (one commander+handler message pair, or
//! one full update round) executes at any instant, regardless of how many
//! connections are attached. State touched only from callbacks therefore
//! needs no synchronization. The flip side: a callback that never returns
//! stalls the whole loop, and a panic inside one terminates it (the
//! commander's `stop` still runs).
//!
//! ## Internal architecture map
//!
//! - API facade: outward [`Commander`]/[`Handler`] contracts
//! - Control plane: connection registry and the shutdown sequencer
//! - Routing: fan-out scope model and target-selection policy
//! - Data plane: per-connection readers and the outbound dispatcher
//! - Runtime: the control-loop task itself
//!
//! ## Observability model
//!
//! The crate uses `tracing` for logs/events. Library code emits events and
//! does not initialize a global subscriber; binaries and tests are
//! responsible for one-time `tracing_subscriber` initialization at process
//! boundaries.

mod api;
pub use api::{Commander, Handler};

mod connection;
pub use connection::Connection;

mod endpoint;
pub use endpoint::Endpoint;

mod error;
pub use error::{RouterError, StartError};

#[doc(hidden)]
pub mod observability;

mod control_plane;
mod data_plane;

mod router;
pub use router::Router;

mod routing;
pub use routing::scope::Scope;

mod runtime;

mod transmitter;
pub use transmitter::Transmitter;
