//! Locker configuration
//!
//! Read once from a root-owned TOML file before anything is locked. Every key
//! is optional; a missing file means all defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::CREDENTIAL_CAPACITY;
use crate::error::{LockError, Result};

/// System-wide configuration path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/veil/config.toml";

/// Which authority decides whether a typed credential is correct
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerifierKind {
    /// Compare against the stored password hash
    #[default]
    Local,
    /// Delegate to PAM
    Pam,
}

/// What to do when some, but not all, screens could be locked
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PartialLockPolicy {
    /// Protect whatever was locked and continue
    #[default]
    Proceed,
    /// Release everything and fail the episode
    Abort,
}

/// Bounded retry for one input grab
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrabRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for GrabRetry {
    fn default() -> Self {
        Self {
            attempts: 1000,
            delay: Duration::from_millis(1),
        }
    }
}

/// Locker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LockConfig {
    pub verifier: VerifierKind,

    /// Service tag handed to PAM
    pub pam_service: String,

    /// Literal that arms credential submission when typed
    pub sentinel: String,

    pub grab_attempts: u32,

    pub grab_retry_delay_ms: u64,

    /// Pause after a rejected credential before input is read again
    pub reject_delay_ms: u64,

    pub partial_lock: PartialLockPolicy,

    /// Status line colour as 0xRRGGBB
    pub status_color: u32,

    pub shadow_path: PathBuf,

    pub mode_message: String,

    pub reject_message: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            verifier: VerifierKind::Local,
            pam_service: "login".to_string(),
            sentinel: "pw".to_string(),
            grab_attempts: 1000,
            grab_retry_delay_ms: 1,
            reject_delay_ms: 1000,
            partial_lock: PartialLockPolicy::Proceed,
            status_color: 0xb0_0000,
            shadow_path: PathBuf::from("/etc/shadow"),
            mode_message: "pw-mode".to_string(),
            reject_message: "wrong password!".to_string(),
        }
    }
}

impl LockConfig {
    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sentinel.is_empty() {
            return Err(LockError::Config("sentinel must not be empty".to_string()));
        }
        // Control characters never reach the buffer, so such a sentinel could
        // never be typed.
        if self.sentinel.bytes().any(|b| b.is_ascii_control()) {
            return Err(LockError::Config(
                "sentinel must not contain control characters".to_string(),
            ));
        }
        if self.sentinel.len() >= CREDENTIAL_CAPACITY {
            return Err(LockError::Config(format!(
                "sentinel must be shorter than {} bytes",
                CREDENTIAL_CAPACITY
            )));
        }
        if self.grab_attempts == 0 {
            return Err(LockError::Config("grab_attempts must be at least 1".to_string()));
        }
        if self.status_color > 0xff_ffff {
            return Err(LockError::Config("status_color must be 0xRRGGBB".to_string()));
        }
        Ok(())
    }

    pub fn grab_retry(&self) -> GrabRetry {
        GrabRetry {
            attempts: self.grab_attempts,
            delay: Duration::from_millis(self.grab_retry_delay_ms),
        }
    }

    pub fn reject_delay(&self) -> Duration {
        Duration::from_millis(self.reject_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = LockConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, LockConfig::default());
        assert_eq!(config.grab_retry(), GrabRetry::default());
        assert_eq!(config.reject_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_file_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "verifier = \"pam\"\npam_service = \"veil\"\npartial_lock = \"abort\"\n",
        )
        .unwrap();

        let config = LockConfig::load(&path).unwrap();
        assert_eq!(config.verifier, VerifierKind::Pam);
        assert_eq!(config.pam_service, "veil");
        assert_eq!(config.partial_lock, PartialLockPolicy::Abort);
        assert_eq!(config.sentinel, "pw");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            LockConfig::from_toml("sentinel = \"\""),
            Err(LockError::Config(_))
        ));
        assert!(matches!(
            LockConfig::from_toml("grab_attempts = 0"),
            Err(LockError::Config(_))
        ));
        assert!(matches!(
            LockConfig::from_toml("status_color = 16777216"),
            Err(LockError::Config(_))
        ));
        assert!(matches!(
            LockConfig::from_toml("verifier = \"kerberos\""),
            Err(LockError::Config(_))
        ));
    }

    #[test]
    fn test_untypeable_sentinel_rejected() {
        assert!(matches!(
            LockConfig::from_toml("sentinel = \"\\t\""),
            Err(LockError::Config(_))
        ));
        assert!(matches!(
            LockConfig::from_toml("sentinel = \"p\\u007fw\""),
            Err(LockError::Config(_))
        ));
        assert!(LockConfig::from_toml("sentinel = \"unlock me\"").is_ok());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(matches!(
            LockConfig::from_toml("partial_lok = \"abort\""),
            Err(LockError::Config(_))
        ));
    }
}
