//! The set of locked screens for one episode

use tracing::{info, warn};

use crate::config::GrabRetry;
use crate::display::DisplayServer;
use crate::head::{self, Head};

/// How much of the display ended up locked
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coverage {
    /// Nothing was locked; there is nothing to protect
    Empty,
    /// Some screens were locked, some were not
    Partial { locked: usize, screens: usize },
    /// Every screen is locked
    Complete,
}

/// Locked heads, one slot per screen that existed when locking started.
///
/// A slot is `None` when that screen could not be locked. Heads are released
/// only through [`LockSet::release_all`].
#[derive(Debug)]
#[must_use = "a lock set must be released with release_all"]
pub struct LockSet {
    slots: Vec<Option<Head>>,
}

impl LockSet {
    /// Try to lock every screen of `display`, in screen order.
    ///
    /// A failure on one screen does not stop the others from being attempted.
    pub fn acquire_all<D: DisplayServer>(display: &mut D, retry: GrabRetry) -> Self {
        let screens = display.screen_count();
        let mut slots: Vec<Option<Head>> = Vec::with_capacity(screens);

        for screen in 0..screens {
            let grabs_shared = slots.iter().any(Option::is_some);
            match head::acquire(display, screen, retry, grabs_shared) {
                Ok(head) => slots.push(Some(head)),
                Err(e) => {
                    warn!(screen, error = %e, "cannot lock screen");
                    slots.push(None);
                }
            }
        }

        if let Err(e) = display.sync() {
            warn!(error = %e, "display sync failed after locking");
        }

        let set = Self { slots };
        info!(locked = set.locked(), screens = set.screens(), "lock set acquired");
        set
    }

    /// Number of screens that existed when locking started
    pub fn screens(&self) -> usize {
        self.slots.len()
    }

    /// Number of screens actually locked
    pub fn locked(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.locked() == 0
    }

    pub fn is_complete(&self) -> bool {
        self.locked() == self.screens()
    }

    pub fn coverage(&self) -> Coverage {
        let locked = self.locked();
        if locked == 0 {
            Coverage::Empty
        } else if locked == self.screens() {
            Coverage::Complete
        } else {
            Coverage::Partial {
                locked,
                screens: self.screens(),
            }
        }
    }

    /// Locked heads in screen order
    pub fn heads(&self) -> impl Iterator<Item = &Head> {
        self.slots.iter().flatten()
    }

    /// Head that carries the status line (the lowest locked screen)
    pub fn status_head(&self) -> Option<&Head> {
        self.heads().next()
    }

    /// Put every locked surface back on top of the stacking order
    pub fn raise_all<D: DisplayServer>(&self, display: &mut D) {
        for head in self.heads() {
            if let Err(e) = display.raise(head.surface()) {
                warn!(screen = head.screen(), error = %e, "cannot raise lock surface");
            }
        }
        if let Err(e) = display.flush() {
            warn!(error = %e, "display flush failed");
        }
    }

    /// Cancel the grabs and free every head, last screen first.
    ///
    /// Errors are logged and skipped so that a failing head never keeps a
    /// later one locked. Returns the number of heads released cleanly.
    pub fn release_all<D: DisplayServer>(self, display: &mut D) -> usize {
        let Self { slots } = self;
        if slots.iter().all(Option::is_none) {
            return 0;
        }

        if let Err(e) = display.ungrab_pointer() {
            warn!(error = %e, "cannot release pointer grab");
        }
        if let Err(e) = display.ungrab_keyboard() {
            warn!(error = %e, "cannot release keyboard grab");
        }

        let mut released = 0;
        for head in slots.into_iter().rev().flatten() {
            let screen = head.screen();
            match head.release(display) {
                Ok(()) => released += 1,
                Err(e) => warn!(screen, error = %e, "cannot release lock surface"),
            }
        }

        if let Err(e) = display.flush() {
            warn!(error = %e, "display flush failed after release");
        }
        released
    }
}
