//! Session synchronizer.

use crate::binding::Observable;
use crate::channel::{Channel, Event};
use crate::config::AuthConfig;
use crate::error::{AuthError, Failure};
use crate::subscription::Unsubscribe;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use super::gate::Gate;
use super::provider::{
    Attribute, IdentityProvider, ProviderErrorKind, ProviderEvent, SignInResponse,
};
use super::session::{to_provider_attributes, Session};
use super::{AUTH_CHANGED, ERROR};

/// Where the synchronizer is in its lifecycle.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionState {
    /// No provider callback yet.
    Uninitialized,
    /// At least one callback seen; `None` when signed out.
    Ready(Option<Session>),
}

/// A pending sign-in challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    pub username: String,
    pub name: String,
}

/// How a sign-in attempt ended.
#[derive(Clone, Debug, PartialEq)]
pub enum SignInOutcome {
    SignedIn(Session),
    /// Continue with [`SessionSync::confirm_sign_in`].
    MfaRequired(Challenge),
    /// Continue with [`SessionSync::complete_new_password`].
    NewPasswordRequired(Challenge),
    /// A confirmation code was resent; continue with
    /// [`SessionSync::confirm_sign_up`].
    Unconfirmed { username: String },
    /// A reset code was sent; continue with
    /// [`SessionSync::confirm_password_reset`].
    PasswordReset { username: String },
    InvalidPassword,
    UnknownUser,
}

struct SyncInner {
    provider: Arc<dyn IdentityProvider>,
    channel: Channel<Event>,
    config: AuthConfig,
    state: RwLock<SessionState>,
    gate: Gate,
}

/// Handle the provider uses to report auth-state events.
#[derive(Clone)]
pub struct ProviderSink {
    inner: Weak<SyncInner>,
}

impl ProviderSink {
    /// Report `event`. Ignored once the synchronizer is gone.
    pub fn deliver(&self, event: ProviderEvent) {
        if let Some(inner) = self.inner.upgrade() {
            SessionSync { inner }.handle(event);
        }
    }
}

impl fmt::Debug for ProviderSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSink")
            .field("attached", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// Keeps the current [`Session`] in step with an identity provider.
///
/// Every provider callback re-normalizes the user, republishes it on the
/// channel's `auth_changed` topic and, the first time, opens the readiness
/// gate that gated actions wait on.
#[derive(Clone)]
pub struct SessionSync {
    inner: Arc<SyncInner>,
}

impl SessionSync {
    /// Attach to `provider` and publish on `channel`.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        channel: Channel<Event>,
        config: AuthConfig,
    ) -> Self {
        let inner = Arc::new(SyncInner {
            provider,
            channel,
            config,
            state: RwLock::new(SessionState::Uninitialized),
            gate: Gate::new(),
        });
        let sink = ProviderSink {
            inner: Arc::downgrade(&inner),
        };
        inner.provider.subscribe(sink);

        Self { inner }
    }

    fn handle(&self, event: ProviderEvent) {
        debug!(?event, "provider event");
        let session = if event.signs_in() {
            match self.fetch(false) {
                Ok(session) => Some(session),
                Err(error) => {
                    warn!(%error, "could not load the signed-in user");
                    self.announce(Failure::from(error));
                    None
                }
            }
        } else {
            None
        };
        self.commit(session);
    }

    fn fetch(&self, bypass_cache: bool) -> Result<Session, AuthError> {
        let attributes = self.inner.provider.current_user(bypass_cache)?;
        Ok(Session::from_attributes(&attributes, &self.inner.config))
    }

    fn commit(&self, session: Option<Session>) {
        *self.inner.state.write() = SessionState::Ready(session.clone());
        // Open before publishing: handlers may call gated actions on this thread.
        if self.inner.gate.open() {
            debug!("session ready");
        }
        self.inner.channel.emit(AUTH_CHANGED, Event::Session(session));
    }

    fn announce(&self, failure: Failure) {
        self.inner.channel.emit(ERROR, Event::Error(failure));
    }

    // --- Reading ---

    pub fn state(&self) -> SessionState {
        self.inner.state.read().clone()
    }

    /// The current user, `None` when signed out or not yet known.
    pub fn session(&self) -> Option<Session> {
        match &*self.inner.state.read() {
            SessionState::Ready(session) => session.clone(),
            SessionState::Uninitialized => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.gate.is_open()
    }

    /// Block until the first provider callback, then return the session.
    pub fn wait_ready(&self) -> Option<Session> {
        self.inner.gate.wait();
        self.session()
    }

    /// Call `handler` with every republished session.
    pub fn on_auth_changed<F>(&self, handler: F) -> Unsubscribe
    where
        F: Fn(Option<&Session>) + Send + Sync + 'static,
    {
        self.inner.channel.on(AUTH_CHANGED, move |event| {
            if let Event::Session(session) = event {
                handler(session.as_ref());
            }
        })
    }

    pub fn channel(&self) -> &Channel<Event> {
        &self.inner.channel
    }

    // --- Gated actions ---

    /// Wrap `action` so that calling it first waits for the session to be
    /// known, then runs with the current session prepended to its
    /// arguments.
    ///
    /// A failure from `action` is announced once on the `error` topic and
    /// then returned to the caller.
    pub fn wait_until_ready<T, R, A>(
        &self,
        action: A,
    ) -> impl Fn(T) -> Result<R, Failure> + Send + Sync
    where
        A: Fn(Option<Session>, T) -> Result<R, Failure> + Send + Sync,
    {
        let sync = self.clone();
        move |args| sync.run_gated(|session| action(session, args))
    }

    fn run_gated<R>(
        &self,
        action: impl FnOnce(Option<Session>) -> Result<R, Failure>,
    ) -> Result<R, Failure> {
        let session = self.wait_ready();
        action(session).map_err(|failure| {
            self.announce(failure.clone());
            failure
        })
    }

    /// Update profile attributes of the signed-in user.
    ///
    /// Keys use the session's field names; see
    /// [`to_provider_attributes`](super::to_provider_attributes).
    pub fn update_profile(&self, patch: Map<String, Value>) -> Result<Session, Failure> {
        self.run_gated(|session| {
            if session.is_none() {
                return Err(AuthError::Unauthenticated.into());
            }
            let attributes = to_provider_attributes(&patch, &self.inner.config);
            self.inner.provider.update_attributes(attributes)?;

            let session = self.fetch(true)?;
            self.commit(Some(session.clone()));
            Ok(session)
        })
    }

    pub fn change_password(&self, old: &str, new: &str) -> Result<(), Failure> {
        self.run_gated(|session| {
            if session.is_none() {
                return Err(AuthError::Unauthenticated.into());
            }
            self.inner.provider.change_password(old, new)?;
            Ok(())
        })
    }

    // --- Sign-in flows ---

    /// Register with `email` as the username. The provider signs the user
    /// in automatically once confirmed.
    pub fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: Map<String, Value>,
    ) -> Result<(), AuthError> {
        let mut attributes = to_provider_attributes(&profile, &self.inner.config);
        attributes.retain(|a| a.name != "email");
        attributes.push(Attribute::new("email", email));
        self.inner.provider.sign_up(email, password, attributes)?;
        Ok(())
    }

    pub fn sign_in(&self, username: &str, password: &str) -> Result<SignInOutcome, AuthError> {
        let provider = &self.inner.provider;

        let error = match provider.sign_in(username, password) {
            Ok(SignInResponse {
                username,
                challenge,
            }) => {
                return match challenge.as_deref() {
                    None => Ok(SignInOutcome::SignedIn(self.fetch(false)?)),
                    Some(name @ ("SMS_MFA" | "SOFTWARE_TOKEN_MFA")) => {
                        Ok(SignInOutcome::MfaRequired(Challenge {
                            username,
                            name: name.to_string(),
                        }))
                    }
                    Some(name @ "NEW_PASSWORD_REQUIRED") => {
                        Ok(SignInOutcome::NewPasswordRequired(Challenge {
                            username,
                            name: name.to_string(),
                        }))
                    }
                    Some(other) => Err(AuthError::UnsupportedChallenge {
                        challenge: other.to_string(),
                    }),
                };
            }
            Err(error) => error,
        };

        let username = username.to_string();
        match error.kind() {
            ProviderErrorKind::UserNotConfirmed => {
                provider.resend_sign_up(&username)?;
                Ok(SignInOutcome::Unconfirmed { username })
            }
            ProviderErrorKind::PasswordResetRequired => {
                provider.forgot_password(&username)?;
                Ok(SignInOutcome::PasswordReset { username })
            }
            ProviderErrorKind::NotAuthorized => Ok(SignInOutcome::InvalidPassword),
            ProviderErrorKind::UserNotFound => Ok(SignInOutcome::UnknownUser),
            ProviderErrorKind::Other => Err(error.into()),
        }
    }

    /// Answer a multi-factor challenge.
    pub fn confirm_sign_in(&self, challenge: &Challenge, code: &str) -> Result<(), AuthError> {
        self.inner
            .provider
            .confirm_sign_in(&challenge.username, code, &challenge.name)?;
        Ok(())
    }

    pub fn complete_new_password(
        &self,
        challenge: &Challenge,
        password: &str,
    ) -> Result<(), AuthError> {
        self.inner
            .provider
            .complete_new_password(&challenge.username, password)?;
        Ok(())
    }

    pub fn confirm_sign_up(&self, username: &str, code: &str) -> Result<(), AuthError> {
        self.inner.provider.confirm_sign_up(username, code)?;
        Ok(())
    }

    pub fn confirm_password_reset(
        &self,
        username: &str,
        code: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        self.inner
            .provider
            .forgot_password_submit(username, code, password)?;
        Ok(())
    }

    pub fn federated_sign_in(&self, provider: &str) -> Result<(), AuthError> {
        self.inner.provider.federated_sign_in(provider)?;
        Ok(())
    }

    pub fn sign_out(&self, global: bool) -> Result<(), AuthError> {
        self.inner.provider.sign_out(global)?;
        Ok(())
    }
}

impl Observable for SessionSync {
    type Snapshot = Option<Session>;

    fn snapshot(&self) -> Option<Session> {
        self.session()
    }

    fn observe(&self, on_change: Box<dyn Fn() + Send + Sync>) -> Unsubscribe {
        self.inner.channel.on(AUTH_CHANGED, move |_| on_change())
    }
}

impl fmt::Debug for SessionSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSync")
            .field("state", &*self.inner.state.read())
            .finish()
    }
}
