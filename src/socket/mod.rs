//! Keyed connection registry.
//!
//! WebSocket-style connections shared per `(url, protocols)` key:
//! - At most one live connection per key
//! - A liveness ping on a fixed interval, stopped on error or close
//! - Message handlers receive frames decoded as JSON, or raw
//!
//! The transport itself is injected through [`Connector`].
//!
//! # Example
//!
//! ```ignore
//! let registry = Registry::new(connector, SocketConfig::default());
//! let socket = registry.acquire("wss://example.com/feed", &["v1"])?;
//!
//! let unsubscribe = socket.on_message(|inbound| match inbound {
//!     Inbound::Json(value) => println!("json: {value}"),
//!     Inbound::Raw(frame) => println!("raw: {frame:?}"),
//! });
//! socket.send_json(&json!({"op": "subscribe"}))?;
//! ```

mod connection;
mod registry;
mod transport;

pub use connection::{Connection, ConnectionEvents, ReadyState};
pub use registry::{connection_key, Registry};
pub use transport::{Connector, Frame, Inbound, Transport, TransportEvent};
