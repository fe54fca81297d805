//! One lock episode, from identity lookup to final release

use tracing::{info, warn};

use crate::account::{AccountSource, Identity};
use crate::config::{LockConfig, PartialLockPolicy, VerifierKind};
use crate::display::DisplayServer;
use crate::error::{DisplayError, LockError, Result};
use crate::input::{InputMachine, InputSettings, RunState};
use crate::lockset::{Coverage, LockSet};
use crate::verifier::{CredentialVerifier, LocalVerifier};

/// How an episode ended without error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpisodeOutcome {
    /// The operator typed a matching credential
    Unlocked,
    /// No screen could be locked, so nothing was protected
    NothingToProtect,
    /// The input loop was stopped without a matching credential
    Aborted,
}

impl EpisodeOutcome {
    /// Process exit status for this outcome
    pub fn exit_code(self) -> i32 {
        match self {
            EpisodeOutcome::Unlocked => 0,
            EpisodeOutcome::NothingToProtect | EpisodeOutcome::Aborted => 1,
        }
    }
}

/// Sequences a single lock episode
pub struct Episode<'a, A: AccountSource> {
    config: &'a LockConfig,
    accounts: &'a A,
}

impl<'a, A: AccountSource> Episode<'a, A> {
    pub fn new(config: &'a LockConfig, accounts: &'a A) -> Self {
        Self { config, accounts }
    }

    /// Run the episode. `open_display` is only called once privileges are gone.
    pub fn run<D, F>(&self, open_display: F) -> Result<EpisodeOutcome>
    where
        D: DisplayServer,
        F: FnOnce() -> std::result::Result<D, DisplayError>,
    {
        let identity = self.accounts.identity()?;
        let verifier = self.prepare_verifier(&identity)?;

        let mut display = open_display()?;
        let locks = LockSet::acquire_all(&mut display, self.config.grab_retry());

        match locks.coverage() {
            Coverage::Empty => {
                info!("no screen could be locked, nothing to protect");
                locks.release_all(&mut display);
                return Ok(EpisodeOutcome::NothingToProtect);
            }
            Coverage::Partial { locked, screens } => {
                warn!(locked, screens, policy = ?self.config.partial_lock, "display only partially locked");
                if self.config.partial_lock == PartialLockPolicy::Abort {
                    locks.release_all(&mut display);
                    return Err(LockError::IncompleteLock { locked, screens });
                }
            }
            Coverage::Complete => {}
        }

        let mut run = RunState::Continue;
        let mut machine = InputMachine::new(verifier.as_ref(), InputSettings::from(self.config));
        let result = machine.run(&mut display, &locks, &mut run);

        let released = locks.release_all(&mut display);
        info!(released, outcome = ?run, "lock released");
        result?;

        Ok(match run {
            RunState::Unlocked => EpisodeOutcome::Unlocked,
            RunState::Continue | RunState::Aborted => EpisodeOutcome::Aborted,
        })
    }

    /// Build the configured verifier and give up elevated privileges.
    ///
    /// The stored secret is read first, since that is the only step that
    /// needs them.
    fn prepare_verifier(&self, identity: &Identity) -> Result<Box<dyn CredentialVerifier>> {
        match self.config.verifier {
            VerifierKind::Local => {
                let secret = self.accounts.stored_secret(identity)?;
                self.accounts.drop_privileges(identity)?;
                Ok(Box::new(LocalVerifier::new(secret)?))
            }
            VerifierKind::Pam => {
                self.accounts.drop_privileges(identity)?;
                pam_verifier(identity, &self.config.pam_service)
            }
        }
    }
}

#[cfg(feature = "pam")]
fn pam_verifier(identity: &Identity, service: &str) -> Result<Box<dyn CredentialVerifier>> {
    Ok(Box::new(crate::verifier::PamVerifier::new(
        identity.name.clone(),
        service,
    )))
}

#[cfg(not(feature = "pam"))]
fn pam_verifier(_identity: &Identity, _service: &str) -> Result<Box<dyn CredentialVerifier>> {
    Err(LockError::VerifierUnavailable(
        "veil was built without PAM support".to_string(),
    ))
}
