//! Credential entry state machine
//!
//! Keys accumulate in a [`CredentialBuffer`]. Nothing is ever submitted until
//! the sentinel literal has been typed: that arms password mode, empties the
//! buffer, and from then on Return hands the buffer to the verifier.
//!
//! ```text
//! Idle --char--> Buffering --sentinel--> PasswordMode --Return/accept--> (unlocked)
//!   ^                |                        |
//!   +----Escape------+-------Escape / reject--+
//! ```

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::buffer::CredentialBuffer;
use crate::config::LockConfig;
use crate::display::{DisplayEvent, DisplayServer, KeyPress};
use crate::error::DisplayError;
use crate::keysym::{self, XK_BACKSPACE, XK_ESCAPE, XK_RETURN};
use crate::lockset::LockSet;
use crate::verifier::CredentialVerifier;

/// Control signal shared by the input loop and the episode controller
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Continue,
    /// A credential matched
    Unlocked,
    /// Stopped from outside, or locking failed
    Aborted,
}

impl RunState {
    pub fn is_running(self) -> bool {
        self == RunState::Continue
    }
}

/// Where the machine currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputState {
    Idle,
    Buffering,
    PasswordMode,
}

/// Tunables for the input loop
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputSettings {
    pub sentinel: String,
    pub reject_delay: Duration,
    pub status_color: u32,
    pub mode_message: String,
    pub reject_message: String,
}

impl From<&LockConfig> for InputSettings {
    fn from(config: &LockConfig) -> Self {
        Self {
            sentinel: config.sentinel.clone(),
            reject_delay: config.reject_delay(),
            status_color: config.status_color,
            mode_message: config.mode_message.clone(),
            reject_message: config.reject_message.clone(),
        }
    }
}

impl Default for InputSettings {
    fn default() -> Self {
        Self::from(&LockConfig::default())
    }
}

/// Reads keys until a credential is accepted
pub struct InputMachine<'v> {
    verifier: &'v dyn CredentialVerifier,
    settings: InputSettings,
    buffer: CredentialBuffer,
    password_mode: bool,
    rejected: u32,
}

impl<'v> InputMachine<'v> {
    pub fn new(verifier: &'v dyn CredentialVerifier, settings: InputSettings) -> Self {
        Self {
            verifier,
            settings,
            buffer: CredentialBuffer::new(),
            password_mode: false,
            rejected: 0,
        }
    }

    pub fn state(&self) -> InputState {
        if self.password_mode {
            InputState::PasswordMode
        } else if self.buffer.is_empty() {
            InputState::Idle
        } else {
            InputState::Buffering
        }
    }

    pub fn password_mode(&self) -> bool {
        self.password_mode
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Number of credentials rejected so far
    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    /// Process events until `run` leaves [`RunState::Continue`].
    ///
    /// Only a broken display connection ends the loop with an error.
    pub fn run<D: DisplayServer>(
        &mut self,
        display: &mut D,
        locks: &LockSet,
        run: &mut RunState,
    ) -> Result<(), DisplayError> {
        while run.is_running() {
            let event = display.next_event()?;
            self.handle_event(display, locks, event, run);
        }
        Ok(())
    }

    pub fn handle_event<D: DisplayServer>(
        &mut self,
        display: &mut D,
        locks: &LockSet,
        event: DisplayEvent,
        run: &mut RunState,
    ) {
        match event {
            DisplayEvent::Key(key) => self.handle_key(display, locks, &key, run),
            // Another client mapped or restacked something; stay on top.
            DisplayEvent::Other => locks.raise_all(display),
        }
    }

    pub fn handle_key<D: DisplayServer>(
        &mut self,
        display: &mut D,
        locks: &LockSet,
        key: &KeyPress,
        run: &mut RunState,
    ) {
        let keysym = keysym::normalize(key.keysym);
        if keysym::is_ignored(keysym) {
            return;
        }

        match keysym {
            XK_RETURN => self.submit(display, locks, run),
            XK_ESCAPE => {
                self.reset();
                self.show_status(display, locks, "");
            }
            XK_BACKSPACE => self.buffer.backspace(),
            _ => self.append(display, locks, &key.text),
        }
    }

    fn submit<D: DisplayServer>(&mut self, display: &mut D, locks: &LockSet, run: &mut RunState) {
        if !self.password_mode {
            return;
        }

        if self.verifier.verify(self.buffer.as_bytes()) {
            info!(verifier = self.verifier.name(), "credential accepted");
            *run = RunState::Unlocked;
        } else {
            self.rejected += 1;
            warn!(verifier = self.verifier.name(), rejected = self.rejected, "credential rejected");
            self.show_status(display, locks, &self.settings.reject_message);
            thread::sleep(self.settings.reject_delay);
        }

        self.reset();
        self.show_status(display, locks, "");
    }

    fn append<D: DisplayServer>(&mut self, display: &mut D, locks: &LockSet, text: &[u8]) {
        match text.first() {
            Some(first) if !first.is_ascii_control() => {}
            _ => return,
        }
        if !self.buffer.push(text) {
            return;
        }

        // Also checked in password mode, where it starts the password over.
        if self.buffer.as_bytes() == self.settings.sentinel.as_bytes() {
            debug!("password mode armed");
            self.password_mode = true;
            self.buffer.clear();
            self.show_status(display, locks, &self.settings.mode_message);
        }
    }

    fn reset(&mut self) {
        self.password_mode = false;
        self.buffer.clear();
    }

    /// Redraw the status line on the lowest locked screen
    fn show_status<D: DisplayServer>(&self, display: &mut D, locks: &LockSet, text: &str) {
        let Some(head) = locks.status_head() else {
            return;
        };
        if let Err(e) = display.draw_status(head.surface(), text, self.settings.status_color) {
            warn!(screen = head.screen(), error = %e, "cannot draw status line");
        }
    }
}
