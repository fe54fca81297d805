//! Error types for the veil locker

use thiserror::Error;

/// Result type alias for locker operations
pub type Result<T> = std::result::Result<T, LockError>;

/// Errors reported by a display collaborator
#[derive(Debug, Error)]
pub enum DisplayError {
    /// The display could not be opened
    #[error("cannot open display: {0}")]
    Connect(String),

    /// A request to the display server failed
    #[error("display request failed: {0}")]
    Request(String),

    /// A server-side resource could not be allocated
    #[error("display allocation failed: {0}")]
    Allocation(String),

    /// The connection went away while the episode was running
    #[error("display connection closed")]
    Closed,
}

/// Errors that end a lock episode
#[derive(Debug, Error)]
pub enum LockError {
    /// The invoking uid has no password database entry
    #[error("no passwd entry for you")]
    NoIdentity,

    /// The stored secret could not be read
    #[error("cannot retrieve password entry: {0}")]
    CredentialSource(String),

    /// The stored secret exists but nothing can ever match it
    #[error("stored credential is unusable: {0}")]
    UnusableCredential(String),

    /// Dropping back to the invoking identity failed
    #[error("cannot drop privileges: {0}")]
    PrivilegeDrop(String),

    /// Display collaborator error
    #[error(transparent)]
    Display(#[from] DisplayError),

    /// Only some of the screens could be locked and the policy forbids that
    #[error("locked {locked} of {screens} screens")]
    IncompleteLock { locked: usize, screens: usize },

    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The configured verifier is not available in this build
    #[error("verifier unavailable: {0}")]
    VerifierUnavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for LockError {
    fn from(e: toml::de::Error) -> Self {
        LockError::Config(e.to_string())
    }
}
