//! A single keyed connection with a liveness probe.

use crate::config::SocketConfig;
use crate::error::SocketError;
use crate::subscription::Unsubscribe;
use crate::types::SubscriptionId;
use crossbeam_channel::{bounded, select, tick, Sender};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::transport::{Connector, Frame, Inbound, Transport, TransportEvent};

type MessageHandler = Arc<dyn Fn(&Inbound) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Transport state as last reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closed,
}

/// Handle a [`Connector`] uses to report transport events.
///
/// Events are dispatched synchronously on the reporting thread.
#[derive(Clone)]
pub struct ConnectionEvents {
    connection: Weak<Connection>,
}

impl ConnectionEvents {
    pub fn deliver(&self, event: TransportEvent) {
        if let Some(connection) = self.connection.upgrade() {
            connection.handle(event);
        }
    }
}

impl fmt::Debug for ConnectionEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionEvents")
            .field("attached", &(self.connection.strong_count() > 0))
            .finish()
    }
}

/// A connection plus message pub/sub over it.
pub struct Connection {
    me: Weak<Connection>,
    key: String,
    url: String,
    protocols: Vec<String>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    state: RwLock<ReadyState>,
    message_handlers: RwLock<Vec<(SubscriptionId, MessageHandler)>>,
    error_handlers: RwLock<Vec<(SubscriptionId, ErrorHandler)>>,
    next_id: AtomicU64,
    /// Dropping the sender stops the probe thread.
    probe: Mutex<Option<Sender<()>>>,
}

impl Connection {
    /// Connect through `connector` and start the liveness probe.
    pub(crate) fn open(
        key: String,
        url: &str,
        protocols: Vec<String>,
        connector: &dyn Connector,
        config: &SocketConfig,
    ) -> Result<Arc<Self>, SocketError> {
        let connection = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            key,
            url: url.to_string(),
            protocols,
            transport: Mutex::new(None),
            state: RwLock::new(ReadyState::Connecting),
            message_handlers: RwLock::new(Vec::new()),
            error_handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            probe: Mutex::new(None),
        });

        let events = ConnectionEvents {
            connection: Arc::downgrade(&connection),
        };
        let transport = connector.connect(url, &connection.protocols, events)?;
        *connection.transport.lock() = Some(Arc::from(transport));

        connection.start_probe(
            config.ping_interval(),
            Frame::Text(config.ping_payload.clone()),
        );
        debug!(key = %connection.key, "connection opened");

        Ok(connection)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.state.read()
    }

    pub fn is_closed(&self) -> bool {
        self.ready_state() == ReadyState::Closed
    }

    /// Whether the liveness probe is still scheduled.
    pub fn is_probing(&self) -> bool {
        self.probe.lock().is_some()
    }

    // --- Sending ---

    pub fn send(&self, frame: impl Into<Frame>) -> Result<(), SocketError> {
        if self.is_closed() {
            return Err(SocketError::Closed);
        }
        let transport = self
            .transport
            .lock()
            .clone()
            .ok_or(SocketError::NotConnected)?;
        transport.send(frame.into())
    }

    /// Serialize `value` and send it as a text frame.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), SocketError> {
        let text = serde_json::to_string(value)?;
        self.send(Frame::Text(text))
    }

    fn ping(&self, payload: &Frame) {
        if let Err(error) = self.send(payload.clone()) {
            trace!(key = %self.key, %error, "ping not sent");
        }
    }

    // --- Receiving ---

    /// Call `handler` with every inbound frame, decoded as JSON when
    /// possible.
    pub fn on_message<F>(&self, handler: F) -> Unsubscribe
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        let id = self.next_subscription();
        self.message_handlers.write().push((id, Arc::new(handler)));
        let connection = self.weak_self();
        Unsubscribe::new(move || {
            if let Some(connection) = connection.upgrade() {
                connection.message_handlers.write().retain(|(other, _)| *other != id);
            }
        })
    }

    /// Call `handler` with every transport error.
    pub fn on_error<F>(&self, handler: F) -> Unsubscribe
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = self.next_subscription();
        self.error_handlers.write().push((id, Arc::new(handler)));
        let connection = self.weak_self();
        Unsubscribe::new(move || {
            if let Some(connection) = connection.upgrade() {
                connection.error_handlers.write().retain(|(other, _)| *other != id);
            }
        })
    }

    fn next_subscription(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn weak_self(&self) -> Weak<Connection> {
        self.me.clone()
    }

    // --- Lifecycle ---

    fn handle(&self, event: TransportEvent) {
        match event {
            TransportEvent::Open => {
                *self.state.write() = ReadyState::Open;
                debug!(key = %self.key, "transport open");
            }
            TransportEvent::Message(frame) => {
                let inbound = Inbound::decode(frame);
                let handlers: Vec<MessageHandler> = self
                    .message_handlers
                    .read()
                    .iter()
                    .map(|(_, handler)| Arc::clone(handler))
                    .collect();
                for handler in handlers {
                    handler(&inbound);
                }
            }
            TransportEvent::Error(message) => {
                warn!(key = %self.key, %message, "transport error");
                self.stop_probe();
                let handlers: Vec<ErrorHandler> = self
                    .error_handlers
                    .read()
                    .iter()
                    .map(|(_, handler)| Arc::clone(handler))
                    .collect();
                for handler in handlers {
                    handler(&message);
                }
            }
            TransportEvent::Close { code, reason } => {
                *self.state.write() = ReadyState::Closed;
                self.stop_probe();
                debug!(key = %self.key, ?code, %reason, "transport closed");
            }
        }
    }

    /// Close the transport and stop the probe.
    pub fn close(&self) {
        *self.state.write() = ReadyState::Closed;
        self.stop_probe();
        let transport = self.transport.lock().take();
        if let Some(transport) = transport {
            transport.close();
        }
    }

    fn start_probe(self: &Arc<Self>, interval: Duration, payload: Frame) {
        let mut probe = self.probe.lock();
        if self.is_closed() || probe.is_some() {
            return;
        }

        let (stop, stopped) = bounded::<()>(0);
        let ticker = tick(interval);
        let connection = Arc::downgrade(self);

        let spawned = thread::Builder::new()
            .name("switchboard-ping".to_string())
            .spawn(move || loop {
                select! {
                    recv(ticker) -> _ => match connection.upgrade() {
                        Some(connection) => connection.ping(&payload),
                        None => break,
                    },
                    recv(stopped) -> _ => break,
                }
            });

        match spawned {
            Ok(_) => *probe = Some(stop),
            Err(error) => warn!(key = %self.key, %error, "could not start liveness probe"),
        }
    }

    fn stop_probe(&self) {
        if self.probe.lock().take().is_some() {
            debug!(key = %self.key, "liveness probe stopped");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.stop_probe();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("key", &self.key)
            .field("state", &self.ready_state())
            .finish()
    }
}
