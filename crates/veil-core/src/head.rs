//! Locking a single screen
//!
//! A [`Head`] only exists once its surface is up and both the pointer and the
//! keyboard are grabbed. Until then every allocated resource is held by a
//! guard that tears it down on drop, so a failed keyboard grab cannot leak the
//! surface, the cursor or the pointer grab.

use std::thread;

use thiserror::Error;
use tracing::{debug, trace};

use crate::config::GrabRetry;
use crate::display::{BitmapId, CursorId, DisplayResult, DisplayServer, GrabStatus, SurfaceId};
use crate::error::DisplayError;

/// Why a screen could not be locked
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("cannot grab pointer after {0} attempts")]
    PointerBusy(u32),

    #[error("cannot grab keyboard after {0} attempts")]
    KeyboardBusy(u32),

    #[error(transparent)]
    Display(#[from] DisplayError),
}

/// Proof that input on a screen was captured.
///
/// Not `Clone`: it is created once by [`acquire`] and consumed when its head is
/// released.
#[derive(Debug, PartialEq, Eq)]
pub struct CaptureToken {
    screen: usize,
}

impl CaptureToken {
    pub fn screen(&self) -> usize {
        self.screen
    }
}

/// One locked screen
#[derive(Debug)]
pub struct Head {
    screen: usize,
    surface: SurfaceId,
    bitmap: BitmapId,
    cursor: CursorId,
    capture: CaptureToken,
}

impl Head {
    pub fn screen(&self) -> usize {
        self.screen
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn capture(&self) -> &CaptureToken {
        &self.capture
    }

    /// Free the cursor, bitmap and surface, attempting all three.
    ///
    /// Returns the first error seen. Grabs are display-wide and are cancelled
    /// by the lock set, not here.
    pub(crate) fn release<D: DisplayServer>(self, display: &mut D) -> DisplayResult<()> {
        let Head {
            surface,
            bitmap,
            cursor,
            ..
        } = self;

        let results = [
            display.free_cursor(cursor),
            display.free_bitmap(bitmap),
            display.destroy_surface(surface),
        ];
        results.into_iter().collect()
    }
}

/// Resources of a head that is still being set up
struct PendingHead<'d, D: DisplayServer> {
    display: &'d mut D,
    screen: usize,
    surface: Option<SurfaceId>,
    bitmap: Option<BitmapId>,
    cursor: Option<CursorId>,
    pointer_grabbed: bool,
    keyboard_grabbed: bool,
    /// Another head already owns the display-wide grabs
    grabs_shared: bool,
}

impl<'d, D: DisplayServer> PendingHead<'d, D> {
    fn new(display: &'d mut D, screen: usize, grabs_shared: bool) -> Self {
        Self {
            display,
            screen,
            surface: None,
            bitmap: None,
            cursor: None,
            pointer_grabbed: false,
            keyboard_grabbed: false,
            grabs_shared,
        }
    }

    /// Hand ownership to a [`Head`]; the guard no longer tears anything down
    fn into_head(mut self) -> Option<Head> {
        let (Some(surface), Some(bitmap), Some(cursor)) = (self.surface, self.bitmap, self.cursor)
        else {
            return None;
        };
        self.surface = None;
        self.bitmap = None;
        self.cursor = None;
        self.pointer_grabbed = false;
        self.keyboard_grabbed = false;

        Some(Head {
            screen: self.screen,
            surface,
            bitmap,
            cursor,
            capture: CaptureToken {
                screen: self.screen,
            },
        })
    }
}

impl<D: DisplayServer> Drop for PendingHead<'_, D> {
    fn drop(&mut self) {
        if !self.grabs_shared {
            if self.keyboard_grabbed {
                let _ = self.display.ungrab_keyboard();
            }
            if self.pointer_grabbed {
                let _ = self.display.ungrab_pointer();
            }
        }
        if let Some(cursor) = self.cursor.take() {
            let _ = self.display.free_cursor(cursor);
        }
        if let Some(bitmap) = self.bitmap.take() {
            let _ = self.display.free_bitmap(bitmap);
        }
        if let Some(surface) = self.surface.take() {
            let _ = self.display.destroy_surface(surface);
        }
    }
}

/// Retry `attempt` until it succeeds or the budget runs out
fn grab_with_retry(
    retry: GrabRetry,
    mut attempt: impl FnMut() -> DisplayResult<GrabStatus>,
) -> DisplayResult<bool> {
    for n in 1..=retry.attempts {
        if attempt()? == GrabStatus::Success {
            trace!(attempts = n, "grab succeeded");
            return Ok(true);
        }
        thread::sleep(retry.delay);
    }
    Ok(false)
}

/// Blank `screen` and take exclusive pointer and keyboard input on it.
///
/// Grabs belong to the whole display connection. When `grabs_shared` is set an
/// earlier head already holds them, and a failure here must not cancel them.
pub fn acquire<D: DisplayServer>(
    display: &mut D,
    screen: usize,
    retry: GrabRetry,
    grabs_shared: bool,
) -> Result<Head, AcquireError> {
    let mut pending = PendingHead::new(display, screen, grabs_shared);

    let geometry = pending.display.geometry(screen)?;
    let surface = pending.display.create_surface(screen, geometry)?;
    pending.surface = Some(surface);

    let bitmap = pending.display.create_blank_bitmap(surface)?;
    pending.bitmap = Some(bitmap);

    let cursor = pending.display.create_invisible_cursor(screen, bitmap)?;
    pending.cursor = Some(cursor);

    pending.display.attach_cursor(surface, cursor)?;
    pending.display.map_raised(surface)?;

    if !grab_with_retry(retry, || pending.display.grab_pointer(screen, cursor))? {
        return Err(AcquireError::PointerBusy(retry.attempts));
    }
    pending.pointer_grabbed = true;

    if !grab_with_retry(retry, || pending.display.grab_keyboard(screen))? {
        return Err(AcquireError::KeyboardBusy(retry.attempts));
    }
    pending.keyboard_grabbed = true;

    pending.display.subscribe_structure(screen)?;

    debug!(screen, width = geometry.width, height = geometry.height, "screen locked");
    pending
        .into_head()
        .ok_or_else(|| DisplayError::Allocation("incomplete head".to_string()).into())
}
