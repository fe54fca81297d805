//! Credential verification
//!
//! Two interchangeable strategies behind [`CredentialVerifier`]:
//! - [`LocalVerifier`] checks against the stored password hash read at
//!   episode start (Argon2 PHC strings, and every crypt(3) method the
//!   system libcrypt knows, yescrypt included)
//! - [`PamVerifier`] (feature `pam`) hands the candidate to PAM
//!
//! Verifiers never retry and keep no state between calls; pacing rejected
//! attempts is the input loop's job.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use tracing::debug;

use crate::account::StoredSecret;
use crate::crypt;
use crate::error::{LockError, Result};

/// Decides whether a typed credential unlocks the display
pub trait CredentialVerifier {
    /// `true` only on a positive match; every error is a rejection
    fn verify(&self, candidate: &[u8]) -> bool;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Hash formats the local verifier can check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashScheme {
    Argon2,
    Crypt,
}

impl HashScheme {
    /// Identify the scheme of a stored hash, `None` if it cannot be checked
    pub fn detect(hash: &str) -> Option<Self> {
        if hash.starts_with("$argon2") {
            Some(Self::Argon2)
        } else if crypt::supports(hash) {
            Some(Self::Crypt)
        } else {
            None
        }
    }
}

/// Compares candidates against the caller's stored password hash
pub struct LocalVerifier {
    secret: StoredSecret,
    scheme: HashScheme,
}

impl LocalVerifier {
    /// Refuses secrets that nothing could ever match, so the display is never
    /// locked with a credential the operator cannot type.
    pub fn new(secret: StoredSecret) -> Result<Self> {
        let hash = secret.as_str();
        if hash.is_empty() {
            return Err(LockError::UnusableCredential("account has no password".to_string()));
        }
        if hash.starts_with('!') || hash.starts_with('*') {
            return Err(LockError::UnusableCredential("account password is locked".to_string()));
        }
        let scheme = HashScheme::detect(hash).ok_or_else(|| {
            LockError::UnusableCredential(
                "unsupported password hash scheme, use the pam verifier".to_string(),
            )
        })?;

        Ok(Self { secret, scheme })
    }

    pub fn scheme(&self) -> HashScheme {
        self.scheme
    }
}

impl CredentialVerifier for LocalVerifier {
    fn verify(&self, candidate: &[u8]) -> bool {
        match self.scheme {
            HashScheme::Argon2 => match PasswordHash::new(self.secret.as_str()) {
                Ok(parsed) => Argon2::default().verify_password(candidate, &parsed).is_ok(),
                Err(e) => {
                    debug!(error = %e, "stored argon2 hash does not parse");
                    false
                }
            },
            HashScheme::Crypt => crypt::verify(candidate, self.secret.as_str()),
        }
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(feature = "pam")]
pub use pam_verifier::PamVerifier;

#[cfg(feature = "pam")]
mod pam_verifier {
    use tracing::warn;
    use zeroize::Zeroizing;

    use super::CredentialVerifier;

    /// Delegates the decision to a PAM service
    pub struct PamVerifier {
        login: String,
        service: String,
    }

    impl PamVerifier {
        pub fn new(login: impl Into<String>, service: impl Into<String>) -> Self {
            Self {
                login: login.into(),
                service: service.into(),
            }
        }
    }

    impl CredentialVerifier for PamVerifier {
        fn verify(&self, candidate: &[u8]) -> bool {
            let password = match std::str::from_utf8(candidate) {
                Ok(s) => Zeroizing::new(s.to_string()),
                Err(_) => return false,
            };

            let mut authenticator = match pam::Authenticator::with_password(&self.service) {
                Ok(a) => a,
                Err(e) => {
                    warn!(service = %self.service, error = ?e, "cannot start PAM conversation");
                    return false;
                }
            };
            authenticator
                .get_handler()
                .set_credentials(self.login.as_str(), password.as_str());
            authenticator.authenticate().is_ok()
        }

        fn name(&self) -> &'static str {
            "pam"
        }
    }
}
