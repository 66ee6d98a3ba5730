//! Transport seam and frame types.

use crate::error::SocketError;
use serde_json::Value;

use super::connection::ConnectionEvents;

/// A WebSocket frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Frame::Text(text.to_string())
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Frame::Text(text)
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Frame::Binary(bytes)
    }
}

/// An inbound frame as handed to message handlers.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// The frame parsed as JSON.
    Json(Value),
    /// The frame as received, when it is not JSON.
    Raw(Frame),
}

impl Inbound {
    pub fn decode(frame: Frame) -> Self {
        let parsed = match &frame {
            Frame::Text(text) => serde_json::from_str(text),
            Frame::Binary(bytes) => serde_json::from_slice(bytes),
        };
        match parsed {
            Ok(value) => Inbound::Json(value),
            Err(_) => Inbound::Raw(frame),
        }
    }
}

/// Lifecycle notifications a transport reports.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    Open,
    Message(Frame),
    Error(String),
    Close { code: Option<u16>, reason: String },
}

/// The sending half of an established transport.
pub trait Transport: Send + Sync {
    fn send(&self, frame: Frame) -> Result<(), SocketError>;

    fn close(&self);
}

/// Opens transports.
///
/// The connector must report every lifecycle event of the new transport
/// through `events`.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        url: &str,
        protocols: &[String],
        events: ConnectionEvents,
    ) -> Result<Box<dyn Transport>, SocketError>;
}
