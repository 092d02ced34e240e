//! The serialized control loop: one callback sequence at a time.

use crate::api::{Commander, Handler};
use crate::data_plane::inbound::InboundEnvelope;
use crate::data_plane::outbound::OutboundEnvelope;
use crate::transmitter::Transmitter;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const CONTROL_LOOP_TAG: &str = "ControlLoop:";
const CONTROL_LOOP_FN_RUN_TAG: &str = "run():";

/// Payload of a panic that escaped a user callback.
type CallbackFault = Box<dyn std::any::Any + Send + 'static>;

enum Wake {
    Stop,
    Inbound(Option<InboundEnvelope>),
    Tick,
}

/// The single flow all user callbacks execute on.
///
/// Races the inbound queue, an optional update tick, and the stop signal;
/// at most one callback sequence (one message pair, or one update round) is
/// ever in flight. That exclusivity is the whole point: state a commander
/// or handler touches from its callbacks needs no further locking.
///
/// A panic escaping a callback aborts the wait loop. The commander's stop
/// callback still runs, then the unwind resumes so the loop task completes
/// panicked.
pub(crate) struct ControlLoop {
    name: String,
    commander: Arc<dyn Commander>,
    handlers: Vec<Arc<dyn Handler>>,
    inbound: Receiver<InboundEnvelope>,
    outbound: Sender<OutboundEnvelope>,
    update_frequency: Option<Duration>,
    stop: CancellationToken,
}

impl ControlLoop {
    pub(crate) fn new(
        name: &str,
        commander: Arc<dyn Commander>,
        handlers: Vec<Arc<dyn Handler>>,
        inbound: Receiver<InboundEnvelope>,
        outbound: Sender<OutboundEnvelope>,
        update_frequency: Option<Duration>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            name: name.to_string(),
            commander,
            handlers,
            inbound,
            outbound,
            update_frequency,
            stop,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(
            "{}:{CONTROL_LOOP_TAG}:{CONTROL_LOOP_FN_RUN_TAG} running",
            self.name
        );

        let update_frequency = self.update_frequency.filter(|rate| !rate.is_zero());
        let fault = match update_frequency {
            Some(rate) => self.run_with_updates(rate).await,
            None => self.run_messages_only().await,
        };

        // Draining: the wait loop is done, no further callback sequence can
        // start. The commander's stop is the last callback the system makes.
        debug!(
            "{}:{CONTROL_LOOP_TAG}:{CONTROL_LOOP_FN_RUN_TAG} draining",
            self.name
        );
        self.commander.stop().await;
        info!(
            "{}:{CONTROL_LOOP_TAG}:{CONTROL_LOOP_FN_RUN_TAG} stopped",
            self.name
        );

        if let Some(fault) = fault {
            std::panic::resume_unwind(fault);
        }
    }

    async fn run_with_updates(&mut self, rate: Duration) -> Option<CallbackFault> {
        // First tick one full period in; ticks that land mid-sequence are
        // missed, never queued.
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + rate, rate);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let wake = tokio::select! {
                _ = self.stop.cancelled() => Wake::Stop,
                envelope = self.inbound.recv() => Wake::Inbound(envelope),
                _ = ticker.tick() => Wake::Tick,
            };
            let sequence = match wake {
                Wake::Stop | Wake::Inbound(None) => return None,
                Wake::Inbound(Some(envelope)) => self.deliver_message(envelope).await,
                Wake::Tick => self.deliver_updates().await,
            };
            if let Err(fault) = sequence {
                return Some(fault);
            }
        }
    }

    async fn run_messages_only(&mut self) -> Option<CallbackFault> {
        loop {
            let wake = tokio::select! {
                _ = self.stop.cancelled() => Wake::Stop,
                envelope = self.inbound.recv() => Wake::Inbound(envelope),
            };
            let sequence = match wake {
                Wake::Stop | Wake::Inbound(None) => return None,
                Wake::Inbound(Some(envelope)) => self.deliver_message(envelope).await,
                Wake::Tick => unreachable!("no ticker in message-only mode"),
            };
            if let Err(fault) = sequence {
                return Some(fault);
            }
        }
    }

    /// One message sequence: commander first, then the origin handler,
    /// with nothing interleaved between the two.
    async fn deliver_message(&self, envelope: InboundEnvelope) -> Result<(), CallbackFault> {
        let InboundEnvelope {
            payload,
            handler,
            connection,
        } = envelope;
        let tr = Transmitter::for_connection(handler.clone(), connection, self.outbound.clone());
        let commander = self.commander.clone();

        let sequence = async {
            commander
                .message(&payload, handler.clone(), tr.clone())
                .await;
            handler.message(&payload, tr).await;
        };
        AssertUnwindSafe(sequence)
            .catch_unwind()
            .await
            .map_err(|fault| self.log_fault(fault, "message"))
    }

    /// One update round: commander at broadcast ceiling, then every
    /// registered handler at its own handler ceiling. Handler order is the
    /// registration map's and must not be relied upon.
    async fn deliver_updates(&self) -> Result<(), CallbackFault> {
        let commander = self.commander.clone();
        let outbound = self.outbound.clone();
        let handlers = &self.handlers;

        let sequence = async {
            commander.update(Transmitter::broadcast(outbound.clone())).await;
            for handler in handlers {
                let tr = Transmitter::for_handler(handler.clone(), outbound.clone());
                handler.update(tr).await;
            }
        };
        AssertUnwindSafe(sequence)
            .catch_unwind()
            .await
            .map_err(|fault| self.log_fault(fault, "update"))
    }

    fn log_fault(&self, fault: CallbackFault, sequence: &str) -> CallbackFault {
        let message = if let Some(text) = fault.downcast_ref::<&str>() {
            text
        } else if let Some(text) = fault.downcast_ref::<String>() {
            text.as_str()
        } else {
            "non-string panic payload"
        };
        error!(
            "{}:{CONTROL_LOOP_TAG}:{CONTROL_LOOP_FN_RUN_TAG} fault in {sequence} sequence: {message}",
            self.name
        );
        fault
    }
}
