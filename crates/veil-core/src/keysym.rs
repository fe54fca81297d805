//! X11 keysym classification
//!
//! Values and ranges follow `X11/keysymdef.h`. The predicates mirror the
//! `Is*Key` macros from `X11/Xutil.h` so that key handling does not depend on
//! any particular display backend.

/// A keysym as delivered by the display server
pub type Keysym = u32;

pub const NO_SYMBOL: Keysym = 0;

pub const XK_BACKSPACE: Keysym = 0xff08;
pub const XK_TAB: Keysym = 0xff09;
pub const XK_RETURN: Keysym = 0xff0d;
pub const XK_ESCAPE: Keysym = 0xff1b;
pub const XK_DELETE: Keysym = 0xffff;

pub const XK_KP_SPACE: Keysym = 0xff80;
pub const XK_KP_ENTER: Keysym = 0xff8d;
pub const XK_KP_F1: Keysym = 0xff91;
pub const XK_KP_F4: Keysym = 0xff94;
pub const XK_KP_MULTIPLY: Keysym = 0xffaa;
pub const XK_KP_0: Keysym = 0xffb0;
pub const XK_KP_9: Keysym = 0xffb9;
pub const XK_KP_EQUAL: Keysym = 0xffbd;

pub const XK_F1: Keysym = 0xffbe;
pub const XK_F35: Keysym = 0xffe0;

pub const XK_SHIFT_L: Keysym = 0xffe1;
pub const XK_HYPER_R: Keysym = 0xffee;
pub const XK_MODE_SWITCH: Keysym = 0xff7e;
pub const XK_NUM_LOCK: Keysym = 0xff7f;
pub const XK_ISO_LOCK: Keysym = 0xfe01;
pub const XK_ISO_LEVEL3_SHIFT: Keysym = 0xfe03;
pub const XK_ISO_LEVEL5_LOCK: Keysym = 0xfe13;

pub const XK_SELECT: Keysym = 0xff60;
pub const XK_BREAK: Keysym = 0xff6b;

pub const XK_0: Keysym = 0x0030;

/// Offset of the directly encoded Unicode keysym plane
const UNICODE_OFFSET: Keysym = 0x0100_0000;

pub fn is_keypad_key(keysym: Keysym) -> bool {
    (XK_KP_SPACE..=XK_KP_EQUAL).contains(&keysym)
}

pub fn is_private_keypad_key(keysym: Keysym) -> bool {
    (0x1100_0000..=0x1100_ffff).contains(&keysym)
}

pub fn is_function_key(keysym: Keysym) -> bool {
    (XK_F1..=XK_F35).contains(&keysym)
}

pub fn is_misc_function_key(keysym: Keysym) -> bool {
    (XK_SELECT..=XK_BREAK).contains(&keysym)
}

pub fn is_pf_key(keysym: Keysym) -> bool {
    (XK_KP_F1..=XK_KP_F4).contains(&keysym)
}

pub fn is_modifier_key(keysym: Keysym) -> bool {
    (XK_SHIFT_L..=XK_HYPER_R).contains(&keysym)
        || (XK_ISO_LOCK..=XK_ISO_LEVEL5_LOCK).contains(&keysym)
        || keysym == XK_MODE_SWITCH
        || keysym == XK_NUM_LOCK
}

/// Fold keypad Enter and keypad digits onto their main-keyboard keysyms.
///
/// Every other keysym is returned unchanged.
pub fn normalize(keysym: Keysym) -> Keysym {
    match keysym {
        XK_KP_ENTER => XK_RETURN,
        XK_KP_0..=XK_KP_9 => keysym - XK_KP_0 + XK_0,
        _ => keysym,
    }
}

/// Whether a (normalized) keysym never contributes to the credential buffer
pub fn is_ignored(keysym: Keysym) -> bool {
    is_function_key(keysym)
        || is_keypad_key(keysym)
        || is_misc_function_key(keysym)
        || is_pf_key(keysym)
        || is_private_keypad_key(keysym)
        || is_modifier_key(keysym)
}

/// Text produced by a keysym, the way `XLookupString` would report it
pub fn keysym_to_char(keysym: Keysym) -> Option<char> {
    match keysym {
        0x0020..=0x007e | 0x00a0..=0x00ff => char::from_u32(keysym),
        XK_BACKSPACE => Some('\u{8}'),
        XK_TAB => Some('\t'),
        XK_RETURN | XK_KP_ENTER => Some('\r'),
        XK_ESCAPE => Some('\u{1b}'),
        XK_DELETE => Some('\u{7f}'),
        XK_KP_SPACE => Some(' '),
        XK_KP_MULTIPLY..=XK_KP_9 => char::from_u32(keysym - 0xff80),
        XK_KP_EQUAL => Some('='),
        0x0100_0100..=0x0110_ffff => char::from_u32(keysym - UNICODE_OFFSET),
        _ => None,
    }
}
