//! Authentication session synchronizer.
//!
//! This module keeps a normalized [`Session`] in step with an external
//! identity provider:
//! - Provider events re-normalize the user and republish it on
//!   `auth_changed`
//! - A readiness gate holds gated actions until the first provider callback
//! - Errors from gated actions are announced once on `error`
//!
//! The provider itself is a trait ([`IdentityProvider`]); hosted UI,
//! multi-factor and reset protocols stay on its side.
//!
//! # Example
//!
//! ```ignore
//! let sync = SessionSync::new(provider, channel.clone(), AuthConfig::default());
//!
//! let whoami = sync.wait_until_ready(|session, greeting: &str| {
//!     Ok(format!("{greeting}, {:?}", session.map(|s| s.id)))
//! });
//! println!("{}", whoami("hello")?);
//! ```

mod gate;
mod provider;
mod session;
mod sync;

pub use provider::{
    Attribute, IdentityProvider, ProviderError, ProviderErrorKind, ProviderEvent, SignInResponse,
};
pub use session::{to_provider_attributes, Session};
pub use sync::{Challenge, ProviderSink, SessionState, SessionSync, SignInOutcome};

/// Topic the synchronizer republishes sessions on.
pub const AUTH_CHANGED: &str = "auth_changed";

/// Topic failures of gated actions are announced on.
pub const ERROR: &str = "error";
