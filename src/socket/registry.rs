//! Process-wide registry of keyed connections.

use crate::config::SocketConfig;
use crate::error::SocketError;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::connection::Connection;
use super::transport::Connector;

/// Registry key for a `(url, protocols)` pair.
pub fn connection_key<S: AsRef<str>>(url: &str, protocols: &[S]) -> String {
    let protocols: Vec<&str> = protocols.iter().map(AsRef::as_ref).collect();
    format!("{}+{}", protocols.join(","), url)
}

/// Holds at most one live connection per `(url, protocols)` key.
pub struct Registry {
    connector: Arc<dyn Connector>,
    config: SocketConfig,
    connections: Mutex<HashMap<String, Arc<Connection>>>,
}

impl Registry {
    pub fn new(connector: Arc<dyn Connector>, config: SocketConfig) -> Self {
        Self {
            connector,
            config,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// The live connection for `(url, protocols)`, connecting a new one if
    /// there is none or the registered one has closed.
    pub fn acquire<S: AsRef<str>>(
        &self,
        url: &str,
        protocols: &[S],
    ) -> Result<Arc<Connection>, SocketError> {
        let key = connection_key(url, protocols);

        // Held across connect so concurrent callers never open two.
        let mut connections = self.live();
        if let Some(existing) = connections.get(&key) {
            return Ok(Arc::clone(existing));
        }

        let protocols = protocols.iter().map(|p| p.as_ref().to_string()).collect();
        let connection = Connection::open(
            key.clone(),
            url,
            protocols,
            self.connector.as_ref(),
            &self.config,
        )?;
        connections.insert(key, Arc::clone(&connection));
        Ok(connection)
    }

    /// Registered connection for the key, if it is still open.
    pub fn get<S: AsRef<str>>(&self, url: &str, protocols: &[S]) -> Option<Arc<Connection>> {
        self.live().get(&connection_key(url, protocols)).cloned()
    }

    /// Number of open connections.
    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lock the map after evicting closed connections.
    fn live(&self) -> MutexGuard<'_, HashMap<String, Arc<Connection>>> {
        let mut connections = self.connections.lock();
        connections.retain(|key, connection| {
            let open = !connection.is_closed();
            if !open {
                debug!(%key, "evicting closed connection");
            }
            open
        });
        connections
    }

    /// Close and forget every connection.
    pub fn close_all(&self) {
        let drained: Vec<Arc<Connection>> =
            self.connections.lock().drain().map(|(_, c)| c).collect();
        for connection in drained {
            connection.close();
        }
        debug!("all connections closed");
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("connections", &self.len())
            .finish()
    }
}
