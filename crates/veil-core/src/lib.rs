//! Veil Core - input capture and credential entry for a display locker
//!
//! This crate holds everything the locker does that is not specific to a
//! windowing system:
//! - Locking every screen with bounded-retry pointer and keyboard grabs
//! - All-or-nothing release of the locked screens
//! - The credential entry state machine and its sentinel-armed password mode
//! - Local (password hash) and delegated (PAM) credential verification
//! - Sequencing of a whole lock episode
//!
//! # Optional Features
//!
//! - `pam` - Enable the PAM credential verifier

pub mod account;
pub mod buffer;
pub mod config;
pub mod crypt;
pub mod display;
pub mod episode;
pub mod error;
pub mod head;
pub mod input;
pub mod keysym;
pub mod lockset;
pub mod verifier;

pub use account::{AccountSource, Identity, StoredSecret, SystemAccounts};
pub use buffer::{CredentialBuffer, CREDENTIAL_CAPACITY};
pub use config::{GrabRetry, LockConfig, PartialLockPolicy, VerifierKind, DEFAULT_CONFIG_PATH};
pub use display::{
    BitmapId, CursorId, DisplayEvent, DisplayResult, DisplayServer, Geometry, GrabStatus,
    KeyPress, SurfaceId,
};
pub use episode::{Episode, EpisodeOutcome};
pub use error::{DisplayError, LockError, Result};
pub use head::{AcquireError, CaptureToken, Head};
pub use input::{InputMachine, InputSettings, InputState, RunState};
pub use lockset::{Coverage, LockSet};
pub use verifier::{CredentialVerifier, HashScheme, LocalVerifier};

#[cfg(feature = "pam")]
pub use verifier::PamVerifier;

/// Locker version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
