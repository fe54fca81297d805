//! Veil X11 - X Window System backend for the veil display locker
//!
//! [`X11Display`] implements [`veil_core::DisplayServer`] on a single
//! pure-Rust `x11rb` connection. Key events are translated with the core
//! keyboard mapping fetched at connect time and refetched whenever the server
//! announces a new one (see [`keymap`]).

pub mod keymap;

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::protocol::xproto::{
    ChangeGCAux, ChangeWindowAttributesAux, ConfigureWindowAux, ConnectionExt as _,
    CreateGCAux, CreateWindowAux, EventMask, Gcontext, GrabMode, GrabStatus as XGrabStatus,
    Mapping, Rectangle, Screen, StackMode, Window, WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::{COPY_DEPTH_FROM_PARENT, CURRENT_TIME, NONE};

use veil_core::{
    BitmapId, CursorId, DisplayError, DisplayEvent, DisplayResult, DisplayServer, Geometry,
    GrabStatus, KeyPress, SurfaceId,
};

use crate::keymap::{Keymap, ModifierMasks};

/// Side of the square bitmap behind the invisible cursor
const CURSOR_BITMAP_SIZE: u16 = 8;

/// Baseline of the status line, in pixels from the top
const STATUS_BASELINE: i16 = 12;

/// Errors raised by the X11 backend
#[derive(Debug, Error)]
pub enum X11Error {
    #[error("cannot open display: {0}")]
    Connect(#[from] ConnectError),

    #[error("X connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("X request failed: {0}")]
    Reply(#[from] ReplyError),

    #[error("cannot allocate X resource: {0}")]
    Id(#[from] ReplyOrIdError),

    #[error("no such screen: {0}")]
    NoScreen(usize),

    #[error("unknown window {0:#x}")]
    UnknownSurface(Window),
}

impl From<X11Error> for DisplayError {
    fn from(err: X11Error) -> Self {
        match err {
            X11Error::Connect(e) => DisplayError::Connect(e.to_string()),
            X11Error::Id(e) => DisplayError::Allocation(e.to_string()),
            other => DisplayError::Request(other.to_string()),
        }
    }
}

trait OrDisplay<T> {
    fn or_display(self) -> DisplayResult<T>;
}

impl<T, E: Into<X11Error>> OrDisplay<T> for Result<T, E> {
    fn or_display(self) -> DisplayResult<T> {
        self.map_err(|e| DisplayError::from(e.into()))
    }
}

/// Bookkeeping for one blocking window
struct Surface {
    screen: usize,
    /// Created on the first status line drawn on this window
    gc: Option<Gcontext>,
}

/// Display server backed by an X11 connection
pub struct X11Display {
    conn: RustConnection,
    keymap: Keymap,
    surfaces: HashMap<Window, Surface>,
}

impl X11Display {
    /// Connect to the display named by `$DISPLAY`
    pub fn connect() -> Result<Self, X11Error> {
        let (conn, default_screen) = x11rb::connect(None)?;
        let keymap = load_keymap(&conn)?;
        info!(
            screens = conn.setup().roots.len(),
            default_screen, "connected to X server"
        );
        Ok(Self {
            conn,
            keymap,
            surfaces: HashMap::new(),
        })
    }

    fn screen(&self, screen: usize) -> Result<&Screen, X11Error> {
        self.conn
            .setup()
            .roots
            .get(screen)
            .ok_or(X11Error::NoScreen(screen))
    }

    fn root(&self, screen: usize) -> DisplayResult<Window> {
        self.screen(screen).map(|s| s.root).or_display()
    }

    fn status_gc(&mut self, surface: Window) -> Result<Gcontext, X11Error> {
        let screen = match self.surfaces.get(&surface) {
            Some(Surface { gc: Some(gc), .. }) => return Ok(*gc),
            Some(state) => state.screen,
            None => return Err(X11Error::UnknownSurface(surface)),
        };
        let black = self.screen(screen)?.black_pixel;

        let gc = self.conn.generate_id()?;
        self.conn
            .create_gc(gc, surface, &CreateGCAux::new().background(black))?;
        if let Some(state) = self.surfaces.get_mut(&surface) {
            state.gc = Some(gc);
        }
        Ok(gc)
    }
}

/// Fetch the keyboard mapping and locate the modifiers that affect it
fn load_keymap(conn: &RustConnection) -> Result<Keymap, X11Error> {
    let setup = conn.setup();
    let (min, max) = (setup.min_keycode, setup.max_keycode);
    let count = max.saturating_sub(min).saturating_add(1);
    let mapping = conn.get_keyboard_mapping(min, count)?.reply()?;
    let keymap = Keymap::new(
        min,
        mapping.keysyms_per_keycode,
        mapping.keysyms,
        ModifierMasks::default(),
    );

    let modifiers = conn.get_modifier_mapping()?.reply()?;
    let per_modifier = modifiers.keycodes.len() / 8;
    let masks = keymap.find_modifier_masks(&modifiers.keycodes, per_modifier);
    debug!(?masks, "keyboard mapping loaded");
    Ok(keymap.with_modifier_masks(masks))
}

fn grab_status(status: XGrabStatus) -> GrabStatus {
    if status == XGrabStatus::SUCCESS {
        GrabStatus::Success
    } else {
        GrabStatus::Busy
    }
}

impl DisplayServer for X11Display {
    fn screen_count(&self) -> usize {
        self.conn.setup().roots.len()
    }

    fn geometry(&self, screen: usize) -> DisplayResult<Geometry> {
        let screen = self.screen(screen).or_display()?;
        Ok(Geometry {
            width: screen.width_in_pixels,
            height: screen.height_in_pixels,
        })
    }

    fn create_surface(&mut self, screen: usize, geometry: Geometry) -> DisplayResult<SurfaceId> {
        let (root, visual, black) = {
            let s = self.screen(screen).or_display()?;
            (s.root, s.root_visual, s.black_pixel)
        };
        let window = self.conn.generate_id().or_display()?;
        let aux = CreateWindowAux::new()
            .override_redirect(1u32)
            .background_pixel(black);
        self.conn
            .create_window(
                COPY_DEPTH_FROM_PARENT,
                window,
                root,
                0,
                0,
                geometry.width,
                geometry.height,
                0,
                WindowClass::INPUT_OUTPUT,
                visual,
                &aux,
            )
            .or_display()?;
        self.surfaces.insert(window, Surface { screen, gc: None });
        Ok(SurfaceId(window))
    }

    fn create_blank_bitmap(&mut self, surface: SurfaceId) -> DisplayResult<BitmapId> {
        let pixmap = self.conn.generate_id().or_display()?;
        self.conn
            .create_pixmap(1, pixmap, surface.0, CURSOR_BITMAP_SIZE, CURSOR_BITMAP_SIZE)
            .or_display()?;

        // Pixmap contents start out undefined; clear every bit.
        let gc = self.conn.generate_id().or_display()?;
        self.conn
            .create_gc(gc, pixmap, &CreateGCAux::new().foreground(0))
            .or_display()?;
        let rect = Rectangle {
            x: 0,
            y: 0,
            width: CURSOR_BITMAP_SIZE,
            height: CURSOR_BITMAP_SIZE,
        };
        self.conn.poly_fill_rectangle(pixmap, gc, &[rect]).or_display()?;
        self.conn.free_gc(gc).or_display()?;
        Ok(BitmapId(pixmap))
    }

    fn create_invisible_cursor(&mut self, _screen: usize, bitmap: BitmapId) -> DisplayResult<CursorId> {
        let cursor = self.conn.generate_id().or_display()?;
        self.conn
            .create_cursor(cursor, bitmap.0, bitmap.0, 0, 0, 0, 0, 0, 0, 0, 0)
            .or_display()?;
        Ok(CursorId(cursor))
    }

    fn attach_cursor(&mut self, surface: SurfaceId, cursor: CursorId) -> DisplayResult<()> {
        self.conn
            .change_window_attributes(surface.0, &ChangeWindowAttributesAux::new().cursor(cursor.0))
            .or_display()?;
        Ok(())
    }

    fn map_raised(&mut self, surface: SurfaceId) -> DisplayResult<()> {
        self.conn.map_window(surface.0).or_display()?;
        self.raise(surface)
    }

    fn raise(&mut self, surface: SurfaceId) -> DisplayResult<()> {
        self.conn
            .configure_window(surface.0, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))
            .or_display()?;
        Ok(())
    }

    fn grab_pointer(&mut self, screen: usize, cursor: CursorId) -> DisplayResult<GrabStatus> {
        let root = self.root(screen)?;
        let mask = EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION;
        let reply = self
            .conn
            .grab_pointer(false, root, mask, GrabMode::ASYNC, GrabMode::ASYNC, NONE, cursor.0, CURRENT_TIME)
            .or_display()?
            .reply()
            .or_display()?;
        Ok(grab_status(reply.status))
    }

    fn grab_keyboard(&mut self, screen: usize) -> DisplayResult<GrabStatus> {
        let root = self.root(screen)?;
        let reply = self
            .conn
            .grab_keyboard(true, root, CURRENT_TIME, GrabMode::ASYNC, GrabMode::ASYNC)
            .or_display()?
            .reply()
            .or_display()?;
        Ok(grab_status(reply.status))
    }

    fn ungrab_pointer(&mut self) -> DisplayResult<()> {
        self.conn.ungrab_pointer(CURRENT_TIME).or_display()?;
        Ok(())
    }

    fn ungrab_keyboard(&mut self) -> DisplayResult<()> {
        self.conn.ungrab_keyboard(CURRENT_TIME).or_display()?;
        Ok(())
    }

    fn subscribe_structure(&mut self, screen: usize) -> DisplayResult<()> {
        let root = self.root(screen)?;
        self.conn
            .change_window_attributes(
                root,
                &ChangeWindowAttributesAux::new().event_mask(EventMask::SUBSTRUCTURE_NOTIFY),
            )
            .or_display()?;
        Ok(())
    }

    fn free_cursor(&mut self, cursor: CursorId) -> DisplayResult<()> {
        self.conn.free_cursor(cursor.0).or_display()?;
        Ok(())
    }

    fn free_bitmap(&mut self, bitmap: BitmapId) -> DisplayResult<()> {
        self.conn.free_pixmap(bitmap.0).or_display()?;
        Ok(())
    }

    fn destroy_surface(&mut self, surface: SurfaceId) -> DisplayResult<()> {
        if let Some(Surface { gc: Some(gc), .. }) = self.surfaces.remove(&surface.0) {
            self.conn.free_gc(gc).or_display()?;
        }
        self.conn.destroy_window(surface.0).or_display()?;
        Ok(())
    }

    fn draw_status(&mut self, surface: SurfaceId, text: &str, color: u32) -> DisplayResult<()> {
        let gc = self.status_gc(surface.0).or_display()?;
        self.conn
            .change_gc(gc, &ChangeGCAux::new().foreground(color))
            .or_display()?;
        self.conn.clear_area(false, surface.0, 0, 0, 0, 0).or_display()?;
        // ImageText8 carries at most 255 bytes.
        let bytes = &text.as_bytes()[..text.len().min(255)];
        if !bytes.is_empty() {
            self.conn
                .image_text8(surface.0, gc, 0, STATUS_BASELINE, bytes)
                .or_display()?;
        }
        self.flush()
    }

    fn next_event(&mut self) -> DisplayResult<DisplayEvent> {
        let event = self.conn.wait_for_event().map_err(|e| {
            warn!(error = %e, "X connection lost");
            DisplayError::Closed
        })?;
        Ok(match event {
            Event::KeyPress(press) => {
                let (keysym, text) = self.keymap.translate(press.detail, u16::from(press.state));
                DisplayEvent::Key(KeyPress::new(keysym, text))
            }
            Event::MappingNotify(notify) if notify.request != Mapping::POINTER => {
                match load_keymap(&self.conn) {
                    Ok(keymap) => self.keymap = keymap,
                    Err(e) => warn!(error = %e, "keeping previous keyboard mapping"),
                }
                DisplayEvent::Other
            }
            Event::Error(e) => {
                // Asynchronous errors from fire-and-forget requests land here.
                debug!(error = ?e, "X error event");
                DisplayEvent::Other
            }
            _ => DisplayEvent::Other,
        })
    }

    fn flush(&mut self) -> DisplayResult<()> {
        self.conn.flush().or_display()
    }

    fn sync(&mut self) -> DisplayResult<()> {
        self.conn.get_input_focus().or_display()?.reply().or_display()?;
        Ok(())
    }
}
