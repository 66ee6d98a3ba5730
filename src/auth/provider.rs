//! The identity provider seam.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::sync::ProviderSink;

/// One provider-side user attribute, e.g. `{ name: "custom:role", value: "admin" }`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Auth-state notifications raised by the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderEvent {
    SignIn,
    SignUp,
    AutoSignIn,
    SignOut,
    SessionExpired,
}

impl ProviderEvent {
    /// Parse a provider hub event name (`"signIn"`, `"sessionExpired"`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "signIn" => Some(ProviderEvent::SignIn),
            "signUp" => Some(ProviderEvent::SignUp),
            "autoSignIn" => Some(ProviderEvent::AutoSignIn),
            "signOut" => Some(ProviderEvent::SignOut),
            "sessionExpired" => Some(ProviderEvent::SessionExpired),
            _ => None,
        }
    }

    /// Whether a user is present after this event.
    pub fn signs_in(self) -> bool {
        matches!(
            self,
            ProviderEvent::SignIn | ProviderEvent::SignUp | ProviderEvent::AutoSignIn
        )
    }
}

/// A failed provider call, identified by the provider's error code.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(operation: &str) -> Self {
        Self::new(
            "NotSupportedException",
            format!("provider does not implement {operation}"),
        )
    }

    pub fn kind(&self) -> ProviderErrorKind {
        ProviderErrorKind::from_code(&self.code)
    }
}

/// The provider error codes sign-in distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
    UserNotConfirmed,
    PasswordResetRequired,
    NotAuthorized,
    UserNotFound,
    Other,
}

impl ProviderErrorKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            "UserNotConfirmedException" => ProviderErrorKind::UserNotConfirmed,
            "PasswordResetRequiredException" => ProviderErrorKind::PasswordResetRequired,
            "NotAuthorizedException" => ProviderErrorKind::NotAuthorized,
            "UserNotFoundException" => ProviderErrorKind::UserNotFound,
            _ => ProviderErrorKind::Other,
        }
    }
}

/// Result of the first sign-in step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignInResponse {
    pub username: String,
    /// Pending challenge name (`"SMS_MFA"`, `"NEW_PASSWORD_REQUIRED"`, ...).
    pub challenge: Option<String>,
}

/// A managed identity service.
///
/// Only state notifications and the current-user query are required; the
/// remaining operations default to a `NotSupportedException` error.
/// Implementations must not hold internal locks while calling
/// [`ProviderSink::deliver`], since delivery queries the provider again.
pub trait IdentityProvider: Send + Sync {
    /// Start delivering auth-state events to `sink`.
    fn subscribe(&self, sink: ProviderSink);

    /// Attributes of the signed-in user.
    fn current_user(&self, bypass_cache: bool) -> Result<Vec<Attribute>, ProviderError>;

    fn update_attributes(&self, _attributes: Vec<Attribute>) -> Result<(), ProviderError> {
        Err(ProviderError::unsupported("update_attributes"))
    }

    fn change_password(&self, _old: &str, _new: &str) -> Result<(), ProviderError> {
        Err(ProviderError::unsupported("change_password"))
    }

    fn sign_up(
        &self,
        _username: &str,
        _password: &str,
        _attributes: Vec<Attribute>,
    ) -> Result<(), ProviderError> {
        Err(ProviderError::unsupported("sign_up"))
    }

    fn sign_in(&self, _username: &str, _password: &str) -> Result<SignInResponse, ProviderError> {
        Err(ProviderError::unsupported("sign_in"))
    }

    fn confirm_sign_in(
        &self,
        _username: &str,
        _code: &str,
        _challenge: &str,
    ) -> Result<(), ProviderError> {
        Err(ProviderError::unsupported("confirm_sign_in"))
    }

    fn complete_new_password(&self, _username: &str, _password: &str) -> Result<(), ProviderError> {
        Err(ProviderError::unsupported("complete_new_password"))
    }

    fn resend_sign_up(&self, _username: &str) -> Result<(), ProviderError> {
        Err(ProviderError::unsupported("resend_sign_up"))
    }

    fn confirm_sign_up(&self, _username: &str, _code: &str) -> Result<(), ProviderError> {
        Err(ProviderError::unsupported("confirm_sign_up"))
    }

    fn forgot_password(&self, _username: &str) -> Result<(), ProviderError> {
        Err(ProviderError::unsupported("forgot_password"))
    }

    fn forgot_password_submit(
        &self,
        _username: &str,
        _code: &str,
        _password: &str,
    ) -> Result<(), ProviderError> {
        Err(ProviderError::unsupported("forgot_password_submit"))
    }

    /// Hand off to a hosted sign-in page (Google, Facebook, ...).
    fn federated_sign_in(&self, _provider: &str) -> Result<(), ProviderError> {
        Err(ProviderError::unsupported("federated_sign_in"))
    }

    fn sign_out(&self, _global: bool) -> Result<(), ProviderError> {
        Err(ProviderError::unsupported("sign_out"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(ProviderEvent::from_name("signIn"), Some(ProviderEvent::SignIn));
        assert_eq!(
            ProviderEvent::from_name("sessionExpired"),
            Some(ProviderEvent::SessionExpired)
        );
        assert_eq!(ProviderEvent::from_name("tokenRefresh"), None);
        assert!(ProviderEvent::AutoSignIn.signs_in());
        assert!(!ProviderEvent::SignOut.signs_in());
    }

    #[test]
    fn test_error_kinds() {
        let err = ProviderError::new("UserNotFoundException", "no such user");
        assert_eq!(err.kind(), ProviderErrorKind::UserNotFound);
        assert_eq!(err.to_string(), "UserNotFoundException: no such user");
        assert_eq!(
            ProviderErrorKind::from_code("LimitExceededException"),
            ProviderErrorKind::Other
        );
    }
}
