//! End-to-end message-flow behavior through a running router: delivery
//! order, fan-out scopes, ceiling enforcement, and drop semantics.

mod common;

use async_trait::async_trait;
use common::{init_tracing, recv_frame, wait_until, TestConnection};
use control_router::{Commander, Handler, Router, Scope, StartError, Transmitter};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

type EventLog = Arc<StdMutex<Vec<String>>>;

fn log(events: &EventLog, entry: impl Into<String>) {
    events.lock().expect("lock events").push(entry.into());
}

fn snapshot(events: &EventLog) -> Vec<String> {
    events.lock().expect("lock events").clone()
}

/// Detects any two callback bodies executing concurrently.
#[derive(Default)]
struct SequenceGuard {
    in_flight: AtomicBool,
    overlapped: AtomicBool,
}

impl SequenceGuard {
    fn enter(&self) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
    }

    fn exit(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }

    fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

struct RecorderCommander {
    events: EventLog,
    stops: AtomicUsize,
    update_frequency: Option<Duration>,
    message_timeout: Option<Duration>,
    callback_delay: Option<Duration>,
    probe_over_ceiling: bool,
    guard: Option<Arc<SequenceGuard>>,
}

fn recorder_commander(events: &EventLog) -> RecorderCommander {
    RecorderCommander {
        events: events.clone(),
        stops: AtomicUsize::new(0),
        update_frequency: None,
        message_timeout: None,
        callback_delay: None,
        probe_over_ceiling: false,
        guard: None,
    }
}

#[async_trait]
impl Commander for RecorderCommander {
    async fn start(&self, transmitters: HashMap<String, Transmitter>) -> Result<(), StartError> {
        for tr in transmitters.values() {
            assert_eq!(tr.ceiling(), Scope::Handler);
            assert!(tr.handler().is_some());
        }
        Ok(())
    }

    async fn stop(&self) {
        let _ = self.stops.fetch_add(1, Ordering::SeqCst);
        log(&self.events, "commander:stop");
    }

    fn update_frequency(&self) -> Option<Duration> {
        self.update_frequency
    }

    fn message_timeout(&self) -> Option<Duration> {
        self.message_timeout
    }

    async fn update(&self, tr: Transmitter) {
        if let Some(guard) = &self.guard {
            guard.enter();
        }
        assert_eq!(tr.ceiling(), Scope::Broadcast);
        assert_eq!(tr.allowed_scopes(), &[Scope::Broadcast]);
        if self.probe_over_ceiling {
            let accepted = tr.send(b"too-wide", Scope::Handler).await;
            log(&self.events, format!("commander:update_probe:{accepted}"));
        } else {
            log(&self.events, "commander:update");
        }
        if let Some(delay) = self.callback_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(guard) = &self.guard {
            guard.exit();
        }
    }

    async fn message(&self, payload: &[u8], _origin: Arc<dyn Handler>, tr: Transmitter) {
        if let Some(guard) = &self.guard {
            guard.enter();
        }
        assert_eq!(tr.ceiling(), Scope::Connection);
        log(
            &self.events,
            format!("commander:message:{}", String::from_utf8_lossy(payload)),
        );
        if let Some(delay) = self.callback_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(guard) = &self.guard {
            guard.exit();
        }
    }
}

struct RecorderHandler {
    name: &'static str,
    events: EventLog,
    pong_on_ping: bool,
    echo: bool,
    heartbeat: bool,
    probe_over_ceiling: bool,
    callback_delay: Option<Duration>,
    guard: Option<Arc<SequenceGuard>>,
}

fn recorder_handler(name: &'static str, events: &EventLog) -> RecorderHandler {
    RecorderHandler {
        name,
        events: events.clone(),
        pong_on_ping: false,
        echo: false,
        heartbeat: false,
        probe_over_ceiling: false,
        callback_delay: None,
        guard: None,
    }
}

#[async_trait]
impl Handler for RecorderHandler {
    async fn update(&self, tr: Transmitter) {
        if let Some(guard) = &self.guard {
            guard.enter();
        }
        assert_eq!(tr.ceiling(), Scope::Handler);
        assert_eq!(tr.allowed_scopes(), &[Scope::Broadcast, Scope::Handler]);
        if self.probe_over_ceiling {
            let accepted = tr.send(b"too-wide", Scope::Connection).await;
            log(&self.events, format!("{}:update_probe:{accepted}", self.name));
        } else if self.heartbeat {
            assert!(tr.send(b"hb", Scope::Handler).await);
        }
        if let Some(guard) = &self.guard {
            guard.exit();
        }
    }

    async fn message(&self, payload: &[u8], tr: Transmitter) {
        if let Some(guard) = &self.guard {
            guard.enter();
        }
        assert_eq!(tr.ceiling(), Scope::Connection);
        assert_eq!(
            tr.allowed_scopes(),
            &[Scope::Broadcast, Scope::Handler, Scope::Connection]
        );
        log(
            &self.events,
            format!("{}:message:{}", self.name, String::from_utf8_lossy(payload)),
        );
        if let Some(delay) = self.callback_delay {
            tokio::time::sleep(delay).await;
        }
        if self.pong_on_ping && payload == b"ping" {
            assert!(tr.send(b"pong", Scope::Broadcast).await);
        }
        if self.echo {
            assert!(tr.send(payload, Scope::Connection).await);
        }
        if let Some(guard) = &self.guard {
            guard.exit();
        }
    }
}

fn handler_map(handlers: Vec<(&str, RecorderHandler)>) -> HashMap<String, Arc<dyn Handler>> {
    handlers
        .into_iter()
        .map(|(name, handler)| (name.to_string(), Arc::new(handler) as Arc<dyn Handler>))
        .collect()
}

#[tokio::test]
async fn commander_sees_each_message_before_its_origin_handler() {
    init_tracing();
    let events: EventLog = Arc::new(StdMutex::new(Vec::new()));
    let commander = Arc::new(recorder_commander(&events));
    let handlers = handler_map(vec![
        (
            "alpha",
            RecorderHandler {
                pong_on_ping: true,
                ..recorder_handler("alpha", &events)
            },
        ),
        ("beta", recorder_handler("beta", &events)),
    ]);

    let router = Router::new("scenario", 16, commander, handlers)
        .await
        .expect("router starts");

    let (conn_a, mut peer_a) = TestConnection::pair();
    let (conn_b, mut peer_b) = TestConnection::pair();
    router
        .endpoint("alpha")
        .expect("alpha endpoint")
        .attach(conn_a)
        .await
        .expect("attach alpha");
    router
        .endpoint("beta")
        .expect("beta endpoint")
        .attach(conn_b)
        .await
        .expect("attach beta");

    peer_a
        .to_router
        .send(b"ping".to_vec())
        .expect("inject ping");

    // The broadcast pong reaches both connections.
    assert_eq!(recv_frame(&mut peer_a.from_router).await, b"pong");
    assert_eq!(recv_frame(&mut peer_b.from_router).await, b"pong");

    assert_eq!(
        snapshot(&events),
        vec!["commander:message:ping", "alpha:message:ping"]
    );

    router.shutdown().await;
}

#[tokio::test]
async fn connection_scope_reaches_only_the_origin_connection() {
    init_tracing();
    let events: EventLog = Arc::new(StdMutex::new(Vec::new()));
    let commander = Arc::new(recorder_commander(&events));
    let handlers = handler_map(vec![(
        "alpha",
        RecorderHandler {
            echo: true,
            ..recorder_handler("alpha", &events)
        },
    )]);

    let router = Router::new("echo", 16, commander, handlers)
        .await
        .expect("router starts");
    let endpoint = router.endpoint("alpha").expect("alpha endpoint");

    let (conn_one, mut peer_one) = TestConnection::pair();
    let (conn_two, mut peer_two) = TestConnection::pair();
    endpoint.attach(conn_one).await.expect("attach one");
    endpoint.attach(conn_two).await.expect("attach two");

    peer_one
        .to_router
        .send(b"hello".to_vec())
        .expect("inject hello");

    assert_eq!(recv_frame(&mut peer_one.from_router).await, b"hello");
    assert!(peer_two.from_router.try_recv().is_err());

    router.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn handler_scope_reaches_exactly_that_handlers_connections() {
    init_tracing();
    let events: EventLog = Arc::new(StdMutex::new(Vec::new()));
    let commander = Arc::new(RecorderCommander {
        update_frequency: Some(Duration::from_millis(20)),
        ..recorder_commander(&events)
    });
    let handlers = handler_map(vec![
        (
            "alpha",
            RecorderHandler {
                heartbeat: true,
                ..recorder_handler("alpha", &events)
            },
        ),
        ("beta", recorder_handler("beta", &events)),
    ]);

    let router = Router::new("heartbeat", 16, commander, handlers)
        .await
        .expect("router starts");

    let alpha = router.endpoint("alpha").expect("alpha endpoint");
    let (conn_a1, mut peer_a1) = TestConnection::pair();
    let (conn_a2, mut peer_a2) = TestConnection::pair();
    alpha.attach(conn_a1).await.expect("attach a1");
    alpha.attach(conn_a2).await.expect("attach a2");

    let beta = router.endpoint("beta").expect("beta endpoint");
    let (conn_b, mut peer_b) = TestConnection::pair();
    beta.attach(conn_b).await.expect("attach b");

    assert_eq!(recv_frame(&mut peer_a1.from_router).await, b"hb");
    assert_eq!(recv_frame(&mut peer_a2.from_router).await, b"hb");
    assert!(peer_b.from_router.try_recv().is_err());

    router.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn sends_above_the_ceiling_are_rejected_with_no_output() {
    init_tracing();
    let events: EventLog = Arc::new(StdMutex::new(Vec::new()));
    let commander = Arc::new(RecorderCommander {
        update_frequency: Some(Duration::from_millis(10)),
        probe_over_ceiling: true,
        ..recorder_commander(&events)
    });
    let handlers = handler_map(vec![(
        "alpha",
        RecorderHandler {
            probe_over_ceiling: true,
            ..recorder_handler("alpha", &events)
        },
    )]);

    let router = Router::new("probe", 16, commander, handlers)
        .await
        .expect("router starts");
    let (conn, mut peer) = TestConnection::pair();
    router
        .endpoint("alpha")
        .expect("alpha endpoint")
        .attach(conn)
        .await
        .expect("attach");

    let probed = {
        let events = events.clone();
        move || {
            let events = snapshot(&events);
            events.iter().any(|e| e.starts_with("commander:update_probe:"))
                && events.iter().any(|e| e.starts_with("alpha:update_probe:"))
        }
    };
    wait_until(probed, "both probes to run").await;

    for event in snapshot(&events) {
        if event.contains("update_probe") {
            assert!(event.ends_with("false"), "over-ceiling send accepted: {event}");
        }
    }
    assert!(peer.from_router.try_recv().is_err());

    router.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn nothing_is_dropped_when_no_timeout_is_configured() {
    init_tracing();
    let events: EventLog = Arc::new(StdMutex::new(Vec::new()));
    let commander = Arc::new(RecorderCommander {
        callback_delay: Some(Duration::from_millis(100)),
        ..recorder_commander(&events)
    });
    let handlers = handler_map(vec![("alpha", recorder_handler("alpha", &events))]);

    // A tiny queue so hand-offs spend most of the flood blocked.
    let router = Router::new("flood", 2, commander, handlers)
        .await
        .expect("router starts");
    let (conn, peer) = TestConnection::pair();
    router
        .endpoint("alpha")
        .expect("alpha endpoint")
        .attach(conn)
        .await
        .expect("attach");

    for i in 0..20 {
        peer.to_router
            .send(format!("m{i}").into_bytes())
            .expect("inject");
    }

    let all_delivered = {
        let events = events.clone();
        move || {
            snapshot(&events)
                .iter()
                .filter(|e| e.starts_with("alpha:message:"))
                .count()
                == 20
        }
    };
    wait_until(all_delivered, "all 20 messages to arrive").await;

    let delivered: Vec<String> = snapshot(&events)
        .into_iter()
        .filter_map(|e| e.strip_prefix("alpha:message:").map(str::to_string))
        .collect();
    let expected: Vec<String> = (0..20).map(|i| format!("m{i}")).collect();
    assert_eq!(delivered, expected);

    router.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn hand_offs_blocked_past_the_timeout_are_dropped() {
    init_tracing();
    let events: EventLog = Arc::new(StdMutex::new(Vec::new()));
    let commander = Arc::new(RecorderCommander {
        message_timeout: Some(Duration::from_millis(50)),
        callback_delay: Some(Duration::from_secs(10)),
        ..recorder_commander(&events)
    });
    let handlers = handler_map(vec![("alpha", recorder_handler("alpha", &events))]);

    let router = Router::new("droppy", 1, commander, handlers)
        .await
        .expect("router starts");
    let (conn, peer) = TestConnection::pair();
    router
        .endpoint("alpha")
        .expect("alpha endpoint")
        .attach(conn)
        .await
        .expect("attach");

    // m1 occupies the loop for 10 virtual seconds, m2 fills the queue, and
    // m3's hand-off can only wait 50ms: it must vanish.
    for payload in [b"m1".as_slice(), b"m2", b"m3"] {
        peer.to_router.send(payload.to_vec()).expect("inject");
    }
    tokio::time::sleep(Duration::from_secs(40)).await;

    let delivered: Vec<String> = snapshot(&events)
        .into_iter()
        .filter_map(|e| e.strip_prefix("alpha:message:").map(str::to_string))
        .collect();
    assert_eq!(delivered, vec!["m1".to_string(), "m2".to_string()]);

    router.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn callback_sequences_never_overlap_under_concurrent_traffic() {
    init_tracing();
    let events: EventLog = Arc::new(StdMutex::new(Vec::new()));
    let guard = Arc::new(SequenceGuard::default());
    let commander = Arc::new(RecorderCommander {
        update_frequency: Some(Duration::from_millis(5)),
        callback_delay: Some(Duration::from_millis(2)),
        guard: Some(guard.clone()),
        ..recorder_commander(&events)
    });
    let handlers = handler_map(vec![
        (
            "alpha",
            RecorderHandler {
                callback_delay: Some(Duration::from_millis(2)),
                guard: Some(guard.clone()),
                ..recorder_handler("alpha", &events)
            },
        ),
        (
            "beta",
            RecorderHandler {
                callback_delay: Some(Duration::from_millis(2)),
                guard: Some(guard.clone()),
                ..recorder_handler("beta", &events)
            },
        ),
    ]);

    let router = Router::new("overlap", 4, commander, handlers)
        .await
        .expect("router starts");

    let alpha = router.endpoint("alpha").expect("alpha endpoint");
    let beta = router.endpoint("beta").expect("beta endpoint");
    let (conn_a1, peer_a1) = TestConnection::pair();
    let (conn_a2, peer_a2) = TestConnection::pair();
    let (conn_b, peer_b) = TestConnection::pair();
    alpha.attach(conn_a1).await.expect("attach a1");
    alpha.attach(conn_a2).await.expect("attach a2");
    beta.attach(conn_b).await.expect("attach b");

    for i in 0..15 {
        peer_a1
            .to_router
            .send(format!("a1:{i}").into_bytes())
            .expect("inject");
        peer_a2
            .to_router
            .send(format!("a2:{i}").into_bytes())
            .expect("inject");
        peer_b
            .to_router
            .send(format!("b:{i}").into_bytes())
            .expect("inject");
    }

    let all_delivered = {
        let events = events.clone();
        move || {
            snapshot(&events)
                .iter()
                .filter(|e| e.contains(":message:"))
                .count()
                == 90 // 45 messages, each seen by commander and handler
        }
    };
    wait_until(all_delivered, "all 45 messages to arrive").await;

    assert!(!guard.overlapped(), "two callback sequences overlapped");

    // Per-connection FIFO: each connection's payloads arrive in send order.
    for prefix in ["a1:", "a2:", "b:"] {
        let handler_prefix = if prefix == "b:" { "beta:message:" } else { "alpha:message:" };
        let indices: Vec<usize> = snapshot(&events)
            .iter()
            .filter_map(|e| e.strip_prefix(handler_prefix))
            .filter_map(|rest| rest.strip_prefix(prefix))
            .map(|i| i.parse().expect("numeric payload index"))
            .collect();
        let expected: Vec<usize> = (0..15).collect();
        assert_eq!(indices, expected, "out-of-order delivery for {prefix}");
    }

    router.shutdown().await;
}
