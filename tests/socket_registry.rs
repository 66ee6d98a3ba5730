//! Keyed connection registry against an in-memory transport.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use switchboard::{
    ConnectionEvents, Connector, Frame, Inbound, ReadyState, Registry, SocketConfig, SocketError,
    Transport, TransportEvent, MIN_PING_INTERVAL,
};

/// What a transport has been asked to do.
#[derive(Default)]
struct Wire {
    sent: Mutex<Vec<Frame>>,
    closed: Mutex<bool>,
}

struct MockTransport(Arc<Wire>);

impl Transport for MockTransport {
    fn send(&self, frame: Frame) -> Result<(), SocketError> {
        if *self.0.closed.lock() {
            return Err(SocketError::Send("transport closed".into()));
        }
        self.0.sent.lock().push(frame);
        Ok(())
    }

    fn close(&self) {
        *self.0.closed.lock() = true;
    }
}

struct Opened {
    url: String,
    protocols: Vec<String>,
    events: ConnectionEvents,
    transport: Arc<Wire>,
}

#[derive(Default)]
struct MockConnector {
    opened: Mutex<Vec<Arc<Opened>>>,
    refuse: Mutex<bool>,
}

impl MockConnector {
    fn last(&self) -> Arc<Opened> {
        self.opened.lock().last().cloned().unwrap()
    }

    fn count(&self) -> usize {
        self.opened.lock().len()
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        url: &str,
        protocols: &[String],
        events: ConnectionEvents,
    ) -> Result<Box<dyn Transport>, SocketError> {
        if *self.refuse.lock() {
            return Err(SocketError::Connect(url.to_string(), "refused".into()));
        }
        let wire = Arc::new(Wire::default());
        self.opened.lock().push(Arc::new(Opened {
            url: url.to_string(),
            protocols: protocols.to_vec(),
            events,
            transport: wire.clone(),
        }));
        Ok(Box::new(MockTransport(wire)))
    }
}

/// Route registry logs through the test harness; later calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn registry(ping_interval_ms: u64) -> (Arc<MockConnector>, Registry) {
    init_tracing();
    let connector = Arc::new(MockConnector::default());
    let config = SocketConfig {
        ping_interval_ms,
        ..SocketConfig::default()
    };
    (connector.clone(), Registry::new(connector, config))
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

const WS: &str = "wss://dash.example.com/live";

// --- Keying ---

#[test]
fn test_same_key_shares_connection() {
    let (connector, registry) = registry(60_000);

    let a = registry.acquire(WS, &["v1"]).unwrap();
    let b = registry.acquire(WS, &["v1"]).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(connector.count(), 1);
    assert_eq!(a.key(), "v1+wss://dash.example.com/live");
}

#[test]
fn test_different_protocols_are_distinct() {
    let (connector, registry) = registry(60_000);

    let v1 = registry.acquire(WS, &["v1"]).unwrap();
    let v2 = registry.acquire(WS, &["v2"]).unwrap();
    let none = registry.acquire::<&str>(WS, &[]).unwrap();

    assert!(!Arc::ptr_eq(&v1, &v2));
    assert!(!Arc::ptr_eq(&v1, &none));
    assert_eq!(registry.len(), 3);
    assert_eq!(connector.count(), 3);
    assert_eq!(connector.last().protocols, Vec::<String>::new());
}

#[test]
fn test_concurrent_acquire_connects_once() {
    let (connector, registry) = registry(60_000);
    let registry = Arc::new(registry);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || registry.acquire(WS, &["v1"]).unwrap())
        })
        .collect();
    let connections: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(connector.count(), 1);
    assert!(connections.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[test]
fn test_closed_connection_is_replaced() {
    let (connector, registry) = registry(60_000);

    let first = registry.acquire(WS, &["v1"]).unwrap();
    connector.last().events.deliver(TransportEvent::Close {
        code: Some(1006),
        reason: "abnormal".into(),
    });
    assert!(first.is_closed());

    let second = registry.acquire(WS, &["v1"]).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(connector.count(), 2);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_closed_connections_do_not_accumulate() {
    let (connector, registry) = registry(60_000);

    let one_off = registry.acquire("wss://dash.example.com/once", &["v1"]).unwrap();
    connector.last().events.deliver(TransportEvent::Close {
        code: Some(1000),
        reason: String::new(),
    });
    assert!(one_off.is_closed());
    assert!(registry.get("wss://dash.example.com/once", &["v1"]).is_none());

    registry.acquire(WS, &["v1"]).unwrap();
    assert_eq!(registry.len(), 1);

    registry.get(WS, &["v1"]).unwrap().close();
    assert!(registry.is_empty());
}

#[test]
fn test_connect_failure_registers_nothing() {
    let (connector, registry) = registry(60_000);
    *connector.refuse.lock() = true;

    assert!(matches!(
        registry.acquire(WS, &["v1"]),
        Err(SocketError::Connect(..))
    ));
    assert!(registry.is_empty());
    assert!(registry.get(WS, &["v1"]).is_none());
}

// --- Traffic ---

#[test]
fn test_send_and_send_json() {
    let (connector, registry) = registry(60_000);
    let socket = registry.acquire(WS, &["v1"]).unwrap();
    connector.last().events.deliver(TransportEvent::Open);
    assert_eq!(socket.ready_state(), ReadyState::Open);

    socket.send("hello").unwrap();
    socket.send_json(&json!({ "op": "subscribe", "topic": "cpu" })).unwrap();

    let sent = connector.last().transport.sent.lock().clone();
    assert_eq!(sent[0], Frame::Text("hello".into()));
    assert_eq!(
        sent[1],
        Frame::Text(r#"{"op":"subscribe","topic":"cpu"}"#.into())
    );
}

#[test]
fn test_messages_decoded_for_every_handler() {
    let (connector, registry) = registry(60_000);
    let socket = registry.acquire(WS, &["v1"]).unwrap();
    let opened = connector.last();
    assert_eq!(opened.url, WS);

    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    let sink = first.clone();
    let _a = socket.on_message(move |inbound| sink.lock().push(inbound.clone()));
    let sink = second.clone();
    let b = socket.on_message(move |inbound| sink.lock().push(inbound.clone()));

    opened
        .events
        .deliver(TransportEvent::Message(Frame::Text(r#"{"cpu":0.5}"#.into())));
    b.unsubscribe();
    opened
        .events
        .deliver(TransportEvent::Message(Frame::Text("pong".into())));

    assert_eq!(
        *first.lock(),
        vec![
            Inbound::Json(json!({ "cpu": 0.5 })),
            Inbound::Raw(Frame::Text("pong".into())),
        ]
    );
    assert_eq!(second.lock().len(), 1);
}

#[test]
fn test_send_after_close_fails() {
    let (connector, registry) = registry(60_000);
    let socket = registry.acquire(WS, &["v1"]).unwrap();

    socket.close();
    assert!(matches!(socket.send("late"), Err(SocketError::Closed)));
    assert!(*connector.last().transport.closed.lock());
}

// --- Liveness probe ---

#[test]
fn test_pings_on_interval() {
    let (connector, registry) = registry(10);
    let socket = registry.acquire(WS, &["v1"]).unwrap();
    assert!(socket.is_probing());

    let transport = connector.last().transport.clone();
    assert!(wait_for(|| transport.sent.lock().len() >= 2));
    assert!(transport
        .sent
        .lock()
        .iter()
        .all(|frame| *frame == Frame::Text("ping".into())));
}

#[test]
fn test_zero_interval_does_not_flood() {
    let (connector, registry) = registry(0);
    let socket = registry.acquire(WS, &["v1"]).unwrap();
    let transport = connector.last().transport.clone();

    thread::sleep(Duration::from_millis(100));
    socket.close();

    // At most one ping per MIN_PING_INTERVAL, with slack for scheduling
    let sent = transport.sent.lock().len() as u128;
    assert!(sent <= 100 / MIN_PING_INTERVAL.as_millis() + 2, "sent {sent} pings");
}

#[test]
fn test_error_stops_probe_and_reaches_handlers() {
    let (connector, registry) = registry(10);
    let socket = registry.acquire(WS, &["v1"]).unwrap();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let _sub = socket.on_error(move |message| sink.lock().push(message.to_string()));

    connector
        .last()
        .events
        .deliver(TransportEvent::Error("reset by peer".into()));

    assert!(!socket.is_probing());
    assert_eq!(*errors.lock(), vec!["reset by peer".to_string()]);

    // Let any in-flight tick drain, then make sure nothing else goes out
    thread::sleep(Duration::from_millis(30));
    let transport = connector.last().transport.clone();
    let settled = transport.sent.lock().len();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(transport.sent.lock().len(), settled);
}

#[test]
fn test_close_event_stops_probe() {
    let (connector, registry) = registry(10);
    let socket = registry.acquire(WS, &["v1"]).unwrap();

    connector.last().events.deliver(TransportEvent::Close {
        code: Some(1000),
        reason: String::new(),
    });

    assert!(!socket.is_probing());
    assert_eq!(socket.ready_state(), ReadyState::Closed);
}

#[test]
fn test_close_all() {
    let (connector, registry) = registry(60_000);
    let a = registry.acquire(WS, &["v1"]).unwrap();
    let b = registry.acquire(WS, &["v2"]).unwrap();

    registry.close_all();

    assert!(registry.is_empty());
    assert!(a.is_closed() && b.is_closed());
    assert!(connector
        .opened
        .lock()
        .iter()
        .all(|opened| *opened.transport.closed.lock()));
}
