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

use crate::api::{Commander, Handler};
use crate::control_plane::registry::ConnectionRegistry;
use crate::control_plane::shutdown::ShutdownSequencer;
use crate::data_plane::outbound::OutboundDispatcher;
use crate::endpoint::Endpoint;
use crate::error::RouterError;
use crate::runtime::control_loop::ControlLoop;
use crate::transmitter::Transmitter;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const ROUTER_TAG: &str = "Router:";
const ROUTER_FN_NEW_TAG: &str = "new():";
const ROUTER_FN_SHUTDOWN_TAG: &str = "shutdown():";

/// The assembled system: registry, control loop, dispatcher, and one
/// [`Endpoint`] per registered handler name.
///
/// Construction follows the commander's lead: `Commander::start` gates
/// everything, and its frequency/timeout answers are read once and frozen.
/// Dropping a `Router` without calling [`shutdown`](Router::shutdown)
/// detaches the background tasks rather than tearing them down in order;
/// orderly exit is the caller's responsibility.
pub struct Router {
    name: String,
    endpoints: HashMap<String, Endpoint>,
    registry: Arc<ConnectionRegistry>,
    shutdown_started: AtomicBool,
    sequencer: Mutex<Option<ShutdownSequencer>>,
}

impl Router {
    /// Builds the router and spawns its two persistent flows.
    ///
    /// `queue_capacity` bounds the inbound and outbound queues and must be
    /// non-zero. `handlers` maps each registered name to the handler every
    /// connection mounted under that name is bound to.
    ///
    /// `Commander::start` is invoked with one handler-ceiling transmitter
    /// per name; an `Err` from it aborts construction with nothing spawned.
    pub async fn new(
        name: &str,
        queue_capacity: usize,
        commander: Arc<dyn Commander>,
        handlers: HashMap<String, Arc<dyn Handler>>,
    ) -> Result<Self, RouterError> {
        let name = name.to_string();
        let (outbound_tx, outbound_rx) = mpsc::channel(queue_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(queue_capacity);

        let transmitters: HashMap<String, Transmitter> = handlers
            .iter()
            .map(|(key, handler)| {
                (
                    key.clone(),
                    Transmitter::for_handler(handler.clone(), outbound_tx.clone()),
                )
            })
            .collect();

        if let Err(err) = commander.start(transmitters).await {
            error!("{name}:{ROUTER_TAG}:{ROUTER_FN_NEW_TAG} commander rejected start: {err}");
            return Err(RouterError::Start(err));
        }

        // Read exactly once; frozen for the router's lifetime.
        let update_frequency = commander.update_frequency();
        let message_timeout = commander.message_timeout();

        let registry = Arc::new(ConnectionRegistry::new());
        let reader_stop = CancellationToken::new();
        let control_stop = CancellationToken::new();
        let dispatch_stop = CancellationToken::new();
        let readers = Arc::new(Mutex::new(JoinSet::new()));

        let control_loop = ControlLoop::new(
            &name,
            commander,
            handlers.values().cloned().collect(),
            inbound_rx,
            outbound_tx,
            update_frequency,
            control_stop.clone(),
        );
        let control_handle = tokio::spawn(control_loop.run());

        let dispatcher =
            OutboundDispatcher::new(registry.clone(), outbound_rx, dispatch_stop.clone());
        let dispatch_handle = tokio::spawn(dispatcher.run());

        let endpoints: HashMap<String, Endpoint> = handlers
            .into_iter()
            .map(|(key, handler)| {
                let endpoint = Endpoint::new(
                    &key,
                    handler,
                    registry.clone(),
                    inbound_tx.clone(),
                    message_timeout,
                    reader_stop.clone(),
                    readers.clone(),
                );
                (key, endpoint)
            })
            .collect();

        let sequencer = ShutdownSequencer::new(
            registry.clone(),
            reader_stop,
            readers,
            control_stop,
            control_handle,
            dispatch_stop,
            dispatch_handle,
        );

        debug!(
            "{name}:{ROUTER_TAG}:{ROUTER_FN_NEW_TAG} created with {} endpoints",
            endpoints.len()
        );

        Ok(Self {
            name,
            endpoints,
            registry,
            shutdown_started: AtomicBool::new(false),
            sequencer: Mutex::new(Some(sequencer)),
        })
    }

    /// The registered names, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.endpoints.keys().cloned().collect()
    }

    /// The connect entry point for `name`, if registered.
    pub fn endpoint(&self, name: &str) -> Option<Endpoint> {
        self.endpoints.get(name).cloned()
    }

    /// Number of currently live connections.
    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    /// Tears the system down in order: connections, readers, control loop
    /// (whose last act is `Commander::stop`), then the outbound dispatcher.
    ///
    /// # Panics
    ///
    /// Calling this a second time is a usage error and panics.
    pub async fn shutdown(&self) {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            panic!(
                "{}:{ROUTER_TAG}:{ROUTER_FN_SHUTDOWN_TAG} shutdown may only be called once",
                self.name
            );
        }
        info!(
            "{}:{ROUTER_TAG}:{ROUTER_FN_SHUTDOWN_TAG} shutting down",
            self.name
        );
        let sequencer = self
            .sequencer
            .lock()
            .await
            .take()
            .expect("sequencer consumed only by the first shutdown");
        sequencer.run().await;
        info!(
            "{}:{ROUTER_TAG}:{ROUTER_FN_SHUTDOWN_TAG} shutdown complete",
            self.name
        );
    }
}
