//! Error types for every module, plus the shared `Failure` payload.

use crate::auth::ProviderError;
use crate::state::Shape;
use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing component: {0}")]
    MissingComponent(&'static str),
}

/// Reactive store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Shape mismatch: store holds a {expected:?}, candidate is a {got:?}")]
    ShapeMismatch { expected: Shape, got: Shape },
}

/// Session and identity provider errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("User is not authenticated")]
    Unauthenticated,

    #[error("Unsupported sign-in challenge: {challenge}")]
    UnsupportedChallenge { challenge: String },

    #[error("Identity provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Connection registry errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SocketError {
    #[error("Connection to {0} failed: {1}")]
    Connect(String, String),

    #[error("Connection is not open")]
    NotConnected,

    #[error("Connection is closed")]
    Closed,

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SocketError {
    fn from(e: serde_json::Error) -> Self {
        SocketError::Serialization(e.to_string())
    }
}

/// Backing storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid storage format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Storage is locked by another process")]
    Locked,
}

/// Expiring cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown time unit: {0}")]
    UnknownUnit(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// Result type for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// "Already announced" mark carried by error payloads.
#[derive(Debug, Default)]
pub struct Propagation(AtomicBool);

impl Propagation {
    /// Set the mark. Returns whether it was already set.
    pub fn mark(&self) -> bool {
        self.0.swap(true, Ordering::AcqRel)
    }

    pub fn is_marked(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

struct FailureInner {
    error: Box<dyn StdError + Send + Sync>,
    propagated: Propagation,
}

/// A shared error instance.
///
/// Clones point at the same error and the same propagation mark, so once
/// one clone has been announced on a channel, re-emitting any clone is a
/// no-op.
#[derive(Clone)]
pub struct Failure {
    inner: Arc<FailureInner>,
}

impl Failure {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(FailureInner {
                error: Box::new(error),
                propagated: Propagation::default(),
            }),
        }
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.error.downcast_ref::<E>()
    }

    pub fn is_propagated(&self) -> bool {
        self.inner.propagated.is_marked()
    }

    pub fn propagation(&self) -> &Propagation {
        &self.inner.propagated
    }

    /// Whether both handles point at the same error instance.
    pub fn ptr_eq(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("error", &self.inner.error)
            .field("propagated", &self.is_propagated())
            .finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner.error, f)
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.error.source()
    }
}

impl From<AuthError> for Failure {
    fn from(e: AuthError) -> Self {
        Failure::new(e)
    }
}

impl From<StateError> for Failure {
    fn from(e: StateError) -> Self {
        Failure::new(e)
    }
}

impl From<SocketError> for Failure {
    fn from(e: SocketError) -> Self {
        Failure::new(e)
    }
}

impl From<CacheError> for Failure {
    fn from(e: CacheError) -> Self {
        Failure::new(e)
    }
}

impl From<ProviderError> for Failure {
    fn from(e: ProviderError) -> Self {
        Failure::new(AuthError::from(e))
    }
}
