#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use veil_core::{
    BitmapId, CredentialVerifier, CursorId, DisplayError, DisplayEvent, DisplayResult,
    DisplayServer, Geometry, GrabRetry, GrabStatus, KeyPress, SurfaceId,
};

/// Busy count meaning "never succeeds"
pub const ALWAYS_BUSY: u32 = u32::MAX;

pub fn fast_retry(attempts: u32) -> GrabRetry {
    GrabRetry {
        attempts,
        delay: Duration::ZERO,
    }
}

/// Scripted, in-memory display server that records every request
#[derive(Default)]
pub struct FakeDisplay {
    screens: usize,
    pointer_busy: HashMap<usize, u32>,
    keyboard_busy: HashMap<usize, u32>,
    fail_surface: HashSet<usize>,
    fail_destroy: HashSet<usize>,
    events: VecDeque<DisplayEvent>,
    next_id: u32,
    surface_screens: HashMap<SurfaceId, usize>,

    pub live_surfaces: HashSet<SurfaceId>,
    pub live_bitmaps: HashSet<BitmapId>,
    pub live_cursors: HashSet<CursorId>,
    pub mapped: Vec<SurfaceId>,
    pub raised: Vec<SurfaceId>,
    pub destroyed: Vec<usize>,
    pub pointer_attempts: HashMap<usize, u32>,
    pub keyboard_attempts: HashMap<usize, u32>,
    pub pointer_grabbed: bool,
    pub keyboard_grabbed: bool,
    pub ungrab_pointer_calls: usize,
    pub ungrab_keyboard_calls: usize,
    pub subscribed: Vec<usize>,
    pub statuses: Vec<(SurfaceId, String)>,
    pub events_read: usize,
    pub syncs: usize,
}

impl FakeDisplay {
    pub fn new(screens: usize) -> Self {
        Self {
            screens,
            next_id: 1,
            ..Default::default()
        }
    }

    /// Pointer grabs on `screen` report busy `times` times before succeeding
    pub fn pointer_busy_on(mut self, screen: usize, times: u32) -> Self {
        self.pointer_busy.insert(screen, times);
        self
    }

    pub fn keyboard_busy_on(mut self, screen: usize, times: u32) -> Self {
        self.keyboard_busy.insert(screen, times);
        self
    }

    pub fn surface_fails_on(mut self, screen: usize) -> Self {
        self.fail_surface.insert(screen);
        self
    }

    pub fn destroy_fails_on(mut self, screen: usize) -> Self {
        self.fail_destroy.insert(screen);
        self
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = DisplayEvent>) -> Self {
        self.events.extend(events);
        self
    }

    pub fn push_keys(&mut self, keys: impl IntoIterator<Item = KeyPress>) {
        self.events.extend(keys.into_iter().map(DisplayEvent::Key));
    }

    pub fn screen_of(&self, surface: SurfaceId) -> Option<usize> {
        self.surface_screens.get(&surface).copied()
    }

    /// Last status text drawn, if any
    pub fn last_status(&self) -> Option<&str> {
        self.statuses.last().map(|(_, text)| text.as_str())
    }

    pub fn nothing_live(&self) -> bool {
        self.live_surfaces.is_empty() && self.live_bitmaps.is_empty() && self.live_cursors.is_empty()
    }

    fn id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn grab(busy: &mut HashMap<usize, u32>, attempts: &mut HashMap<usize, u32>, screen: usize) -> GrabStatus {
        *attempts.entry(screen).or_default() += 1;
        match busy.get_mut(&screen) {
            Some(remaining) if *remaining == ALWAYS_BUSY => GrabStatus::Busy,
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                GrabStatus::Busy
            }
            _ => GrabStatus::Success,
        }
    }
}

impl DisplayServer for FakeDisplay {
    fn screen_count(&self) -> usize {
        self.screens
    }

    fn geometry(&self, screen: usize) -> DisplayResult<Geometry> {
        if screen >= self.screens {
            return Err(DisplayError::Request(format!("no screen {}", screen)));
        }
        Ok(Geometry {
            width: 1920,
            height: 1080,
        })
    }

    fn create_surface(&mut self, screen: usize, _geometry: Geometry) -> DisplayResult<SurfaceId> {
        if self.fail_surface.contains(&screen) {
            return Err(DisplayError::Allocation("window".to_string()));
        }
        let surface = SurfaceId(self.id());
        self.live_surfaces.insert(surface);
        self.surface_screens.insert(surface, screen);
        Ok(surface)
    }

    fn create_blank_bitmap(&mut self, _surface: SurfaceId) -> DisplayResult<BitmapId> {
        let bitmap = BitmapId(self.id());
        self.live_bitmaps.insert(bitmap);
        Ok(bitmap)
    }

    fn create_invisible_cursor(&mut self, _screen: usize, _bitmap: BitmapId) -> DisplayResult<CursorId> {
        let cursor = CursorId(self.id());
        self.live_cursors.insert(cursor);
        Ok(cursor)
    }

    fn attach_cursor(&mut self, _surface: SurfaceId, _cursor: CursorId) -> DisplayResult<()> {
        Ok(())
    }

    fn map_raised(&mut self, surface: SurfaceId) -> DisplayResult<()> {
        self.mapped.push(surface);
        Ok(())
    }

    fn raise(&mut self, surface: SurfaceId) -> DisplayResult<()> {
        self.raised.push(surface);
        Ok(())
    }

    fn grab_pointer(&mut self, screen: usize, _cursor: CursorId) -> DisplayResult<GrabStatus> {
        let status = Self::grab(&mut self.pointer_busy, &mut self.pointer_attempts, screen);
        if status == GrabStatus::Success {
            self.pointer_grabbed = true;
        }
        Ok(status)
    }

    fn grab_keyboard(&mut self, screen: usize) -> DisplayResult<GrabStatus> {
        let status = Self::grab(&mut self.keyboard_busy, &mut self.keyboard_attempts, screen);
        if status == GrabStatus::Success {
            self.keyboard_grabbed = true;
        }
        Ok(status)
    }

    fn ungrab_pointer(&mut self) -> DisplayResult<()> {
        self.ungrab_pointer_calls += 1;
        self.pointer_grabbed = false;
        Ok(())
    }

    fn ungrab_keyboard(&mut self) -> DisplayResult<()> {
        self.ungrab_keyboard_calls += 1;
        self.keyboard_grabbed = false;
        Ok(())
    }

    fn subscribe_structure(&mut self, screen: usize) -> DisplayResult<()> {
        self.subscribed.push(screen);
        Ok(())
    }

    fn free_cursor(&mut self, cursor: CursorId) -> DisplayResult<()> {
        self.live_cursors.remove(&cursor);
        Ok(())
    }

    fn free_bitmap(&mut self, bitmap: BitmapId) -> DisplayResult<()> {
        self.live_bitmaps.remove(&bitmap);
        Ok(())
    }

    fn destroy_surface(&mut self, surface: SurfaceId) -> DisplayResult<()> {
        let screen = self.surface_screens[&surface];
        if self.fail_destroy.contains(&screen) {
            return Err(DisplayError::Request("BadWindow".to_string()));
        }
        self.live_surfaces.remove(&surface);
        self.destroyed.push(screen);
        Ok(())
    }

    fn draw_status(&mut self, surface: SurfaceId, text: &str, _color: u32) -> DisplayResult<()> {
        self.statuses.push((surface, text.to_string()));
        Ok(())
    }

    fn next_event(&mut self) -> DisplayResult<DisplayEvent> {
        self.events_read += 1;
        self.events.pop_front().ok_or(DisplayError::Closed)
    }

    fn flush(&mut self) -> DisplayResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> DisplayResult<()> {
        self.syncs += 1;
        Ok(())
    }
}

/// Verifier that accepts one fixed secret and records every candidate
pub struct RecordingVerifier {
    secret: Vec<u8>,
    pub calls: std::cell::RefCell<Vec<Vec<u8>>>,
}

impl RecordingVerifier {
    pub fn accepting(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            calls: Default::default(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl CredentialVerifier for RecordingVerifier {
    fn verify(&self, candidate: &[u8]) -> bool {
        self.calls.borrow_mut().push(candidate.to_vec());
        candidate == self.secret.as_slice()
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Key presses that type `text`
pub fn typed(text: &str) -> Vec<KeyPress> {
    text.chars().map(KeyPress::char).collect()
}

pub fn key(keysym: u32) -> KeyPress {
    let text = veil_core::keysym::keysym_to_char(keysym)
        .map(|c| c.to_string().into_bytes())
        .unwrap_or_default();
    KeyPress::new(keysym, text)
}
