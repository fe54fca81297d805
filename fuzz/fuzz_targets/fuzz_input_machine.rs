#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use veil_core::{
    BitmapId, CredentialVerifier, CursorId, DisplayEvent, DisplayResult, DisplayServer, Geometry,
    GrabRetry, GrabStatus, InputMachine, InputSettings, KeyPress, LockSet, RunState, SurfaceId,
    CREDENTIAL_CAPACITY,
};

/// Single-screen display that accepts every request
struct NullDisplay;

impl DisplayServer for NullDisplay {
    fn screen_count(&self) -> usize {
        1
    }
    fn geometry(&self, _screen: usize) -> DisplayResult<Geometry> {
        Ok(Geometry { width: 640, height: 480 })
    }
    fn create_surface(&mut self, _screen: usize, _geometry: Geometry) -> DisplayResult<SurfaceId> {
        Ok(SurfaceId(1))
    }
    fn create_blank_bitmap(&mut self, _surface: SurfaceId) -> DisplayResult<BitmapId> {
        Ok(BitmapId(2))
    }
    fn create_invisible_cursor(&mut self, _screen: usize, _bitmap: BitmapId) -> DisplayResult<CursorId> {
        Ok(CursorId(3))
    }
    fn attach_cursor(&mut self, _surface: SurfaceId, _cursor: CursorId) -> DisplayResult<()> {
        Ok(())
    }
    fn map_raised(&mut self, _surface: SurfaceId) -> DisplayResult<()> {
        Ok(())
    }
    fn raise(&mut self, _surface: SurfaceId) -> DisplayResult<()> {
        Ok(())
    }
    fn grab_pointer(&mut self, _screen: usize, _cursor: CursorId) -> DisplayResult<GrabStatus> {
        Ok(GrabStatus::Success)
    }
    fn grab_keyboard(&mut self, _screen: usize) -> DisplayResult<GrabStatus> {
        Ok(GrabStatus::Success)
    }
    fn ungrab_pointer(&mut self) -> DisplayResult<()> {
        Ok(())
    }
    fn ungrab_keyboard(&mut self) -> DisplayResult<()> {
        Ok(())
    }
    fn subscribe_structure(&mut self, _screen: usize) -> DisplayResult<()> {
        Ok(())
    }
    fn free_cursor(&mut self, _cursor: CursorId) -> DisplayResult<()> {
        Ok(())
    }
    fn free_bitmap(&mut self, _bitmap: BitmapId) -> DisplayResult<()> {
        Ok(())
    }
    fn destroy_surface(&mut self, _surface: SurfaceId) -> DisplayResult<()> {
        Ok(())
    }
    fn draw_status(&mut self, _surface: SurfaceId, _text: &str, _color: u32) -> DisplayResult<()> {
        Ok(())
    }
    fn next_event(&mut self) -> DisplayResult<DisplayEvent> {
        Ok(DisplayEvent::Other)
    }
    fn flush(&mut self) -> DisplayResult<()> {
        Ok(())
    }
    fn sync(&mut self) -> DisplayResult<()> {
        Ok(())
    }
}

struct NeverAccepts;

impl CredentialVerifier for NeverAccepts {
    fn verify(&self, candidate: &[u8]) -> bool {
        assert!(candidate.len() < CREDENTIAL_CAPACITY);
        false
    }

    fn name(&self) -> &'static str {
        "never"
    }
}

#[derive(Debug, Arbitrary)]
enum Input {
    Key { keysym: u32, text: Vec<u8> },
    Other,
}

fuzz_target!(|inputs: Vec<Input>| {
    let mut display = NullDisplay;
    let retry = GrabRetry {
        attempts: 1,
        delay: Duration::ZERO,
    };
    let locks = LockSet::acquire_all(&mut display, retry);
    let settings = InputSettings {
        reject_delay: Duration::ZERO,
        ..InputSettings::default()
    };
    let verifier = NeverAccepts;
    let mut machine = InputMachine::new(&verifier, settings);
    let mut run = RunState::Continue;

    let mut armed_returns = 0;
    for input in inputs {
        let event = match input {
            Input::Key { keysym, text } => {
                let submits = veil_core::keysym::normalize(keysym) == veil_core::keysym::XK_RETURN;
                if submits && machine.password_mode() {
                    armed_returns += 1;
                }
                DisplayEvent::Key(KeyPress::new(keysym, text))
            }
            Input::Other => DisplayEvent::Other,
        };
        machine.handle_event(&mut display, &locks, event, &mut run);

        assert!(machine.buffer_len() < CREDENTIAL_CAPACITY);
        assert_eq!(run, RunState::Continue);
        // Only Return in password mode ever reaches the verifier.
        assert_eq!(machine.rejected(), armed_returns);
    }

    locks.release_all(&mut display);
});
