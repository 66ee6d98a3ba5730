//! # Switchboard
//!
//! Client-side core for single-page dashboards: the shared plumbing a view
//! layer sits on.
//!
//! ## Core Concepts
//!
//! - **Channel**: Topic pub/sub with alternatives, regex topics and `once`
//! - **State**: Observable stores that keep their shape across writes
//! - **Binding**: Mount/unmount subscription contract for views
//! - **Auth**: Provider session sync with a readiness gate
//! - **Socket**: One live connection per `(url, protocols)`, with pings
//! - **Cache**: Values with a time-to-live over string storage
//!
//! ## Example
//!
//! ```ignore
//! use switchboard::{Context, StateStore, TtlUnit};
//!
//! let context = Context::builder()
//!     .provider(provider)
//!     .connector(connector)
//!     .build()?;
//!
//! // Wait for the first provider callback, then act as the current user
//! let session = context.session().wait_ready();
//!
//! // A store that deep-merges every write
//! let filters = StateStore::new(json!({ "range": "7d" }));
//! filters.write(json!({ "region": "eu" }))?;
//!
//! // Cache a lookup for five minutes
//! context.cache().set("regions", vec!["eu", "us"], 5, TtlUnit::Minutes)?;
//!
//! context.shutdown();
//! ```

pub mod auth;
pub mod binding;
pub mod cache;
pub mod channel;
pub mod config;
pub mod context;
pub mod error;
#[cfg(feature = "server")]
pub mod server;
pub mod socket;
pub mod state;
pub mod subscription;
pub mod types;

// Re-exports
pub use auth::{
    Attribute, Challenge, IdentityProvider, ProviderError, ProviderErrorKind, ProviderEvent,
    ProviderSink, Session, SessionState, SessionSync, SignInOutcome, SignInResponse, AUTH_CHANGED,
    ERROR,
};
pub use binding::{use_session, use_state, Binding, Observable, Renderer};
pub use cache::{ExpiringCache, FileStorage, MemoryStorage, Storage, TtlUnit};
pub use channel::{Channel, Event, Payload, Topic, Topics};
pub use config::{AuthConfig, CacheConfig, Config, SocketConfig, MIN_PING_INTERVAL};
pub use context::{Context, ContextBuilder};
pub use error::{
    AuthError, CacheError, Error, Failure, Propagation, Result, SocketError, StateError,
    StorageError,
};
pub use socket::{
    Connection, ConnectionEvents, Connector, Frame, Inbound, ReadyState, Registry, Transport,
    TransportEvent,
};
pub use state::{Filter, Shape, StateStore};
pub use subscription::Unsubscribe;
pub use types::*;
