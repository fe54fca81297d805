//! Display server collaborator
//!
//! The locker never talks to a windowing system directly. Everything it needs
//! (surfaces, cursors, input grabs, the event queue, a status line) goes
//! through [`DisplayServer`], which the X11 backend implements and the tests
//! replace with a scripted fake.

use crate::error::DisplayError;
use crate::keysym::Keysym;

/// Result alias for display requests
pub type DisplayResult<T> = std::result::Result<T, DisplayError>;

/// Handle of a blocking surface (an X window)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u32);

/// Handle of an offscreen bitmap (an X pixmap)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BitmapId(pub u32);

/// Handle of a cursor glyph
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CursorId(pub u32);

/// Full geometry of one screen
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub width: u16,
    pub height: u16,
}

/// Outcome of a single grab request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrabStatus {
    /// Input is now exclusively ours
    Success,
    /// Another client holds the grab (or the request was refused); retry later
    Busy,
}

/// A key press, already translated to a keysym and its text
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPress {
    pub keysym: Keysym,
    /// Bytes the key would type, empty for keys without text
    pub text: Vec<u8>,
}

impl KeyPress {
    pub fn new(keysym: Keysym, text: impl Into<Vec<u8>>) -> Self {
        Self {
            keysym,
            text: text.into(),
        }
    }

    /// Key press for the keysym that types exactly the character `c`
    pub fn char(c: char) -> Self {
        let code = u32::from(c);
        let keysym = if code < 0x100 { code } else { 0x0100_0000 + code };
        let mut utf8 = [0u8; 4];
        Self::new(keysym, c.encode_utf8(&mut utf8).as_bytes())
    }
}

/// Event delivered by [`DisplayServer::next_event`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisplayEvent {
    Key(KeyPress),
    /// Anything else, typically another client mapping or restacking a window
    Other,
}

/// Narrow interface onto the windowing system
pub trait DisplayServer {
    /// Number of screens that exist on this display
    fn screen_count(&self) -> usize;

    fn geometry(&self, screen: usize) -> DisplayResult<Geometry>;

    /// Create an override-redirect, black-background surface covering `geometry`
    fn create_surface(&mut self, screen: usize, geometry: Geometry) -> DisplayResult<SurfaceId>;

    /// Create an all-zero bitmap on the same screen as `surface`
    fn create_blank_bitmap(&mut self, surface: SurfaceId) -> DisplayResult<BitmapId>;

    /// Build a fully transparent cursor whose source and mask are `bitmap`
    fn create_invisible_cursor(&mut self, screen: usize, bitmap: BitmapId) -> DisplayResult<CursorId>;

    fn attach_cursor(&mut self, surface: SurfaceId, cursor: CursorId) -> DisplayResult<()>;

    /// Map the surface and put it on top of the stacking order
    fn map_raised(&mut self, surface: SurfaceId) -> DisplayResult<()>;

    /// Re-raise an already mapped surface
    fn raise(&mut self, surface: SurfaceId) -> DisplayResult<()>;

    /// One attempt at grabbing the pointer on the screen's root
    fn grab_pointer(&mut self, screen: usize, cursor: CursorId) -> DisplayResult<GrabStatus>;

    /// One attempt at grabbing the keyboard on the screen's root
    fn grab_keyboard(&mut self, screen: usize) -> DisplayResult<GrabStatus>;

    fn ungrab_pointer(&mut self) -> DisplayResult<()>;

    fn ungrab_keyboard(&mut self) -> DisplayResult<()>;

    /// Ask for structure-change notifications on the screen's root
    fn subscribe_structure(&mut self, screen: usize) -> DisplayResult<()>;

    fn free_cursor(&mut self, cursor: CursorId) -> DisplayResult<()>;

    fn free_bitmap(&mut self, bitmap: BitmapId) -> DisplayResult<()>;

    fn destroy_surface(&mut self, surface: SurfaceId) -> DisplayResult<()>;

    /// Clear `surface` and draw a single short line of text on it
    fn draw_status(&mut self, surface: SurfaceId, text: &str, color: u32) -> DisplayResult<()>;

    /// Block until the next event arrives
    fn next_event(&mut self) -> DisplayResult<DisplayEvent>;

    /// Flush buffered requests to the server
    fn flush(&mut self) -> DisplayResult<()>;

    /// Flush and wait until the server has processed every request
    fn sync(&mut self) -> DisplayResult<()>;
}
