//! Process-wide owner of the shared components.

use crate::auth::{IdentityProvider, SessionSync};
use crate::cache::{ExpiringCache, MemoryStorage, Storage};
use crate::channel::{Channel, Event};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::socket::{Connector, Registry};
use crate::types::{Clock, SystemClock};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The channel, connection registry, session synchronizer and cache,
/// created once at startup and shared by handle.
///
/// The synchronizer publishes on the same channel the context exposes.
pub struct Context {
    config: Config,
    channel: Channel<Event>,
    sockets: Registry,
    session: SessionSync,
    cache: ExpiringCache,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn channel(&self) -> &Channel<Event> {
        &self.channel
    }

    pub fn sockets(&self) -> &Registry {
        &self.sockets
    }

    pub fn session(&self) -> &SessionSync {
        &self.session
    }

    pub fn cache(&self) -> &ExpiringCache {
        &self.cache
    }

    /// Close every connection, then refuse further emits.
    pub fn shutdown(&self) {
        self.sockets.close_all();
        self.channel.shutdown();
        debug!("context shut down");
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("sockets", &self.sockets)
            .field("session", &self.session)
            .field("cache", &self.cache)
            .finish()
    }
}

/// Builder for [`Context`].
///
/// The identity provider and connector are required. Storage defaults to
/// [`MemoryStorage`] and the clock to the wall clock.
#[derive(Default)]
pub struct ContextBuilder {
    config: Config,
    provider: Option<Arc<dyn IdentityProvider>>,
    connector: Option<Arc<dyn Connector>>,
    storage: Option<Arc<dyn Storage>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ContextBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Context> {
        let provider = self
            .provider
            .ok_or(Error::MissingComponent("identity provider"))?;
        let connector = self.connector.ok_or(Error::MissingComponent("connector"))?;
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let channel = Channel::new();
        let session = SessionSync::new(provider, channel.clone(), self.config.auth.clone());
        let sockets = Registry::new(connector, self.config.socket.clone());
        let cache = ExpiringCache::new(storage, &self.config.cache).with_clock(clock);

        debug!("context built");
        Ok(Context {
            config: self.config,
            channel,
            sockets,
            session,
            cache,
        })
    }
}
