//! Core-protocol keycode translation
//!
//! Implements the keysym selection rules of the X11 protocol encoding
//! (section 5, "Keyboards") over the core keyboard mapping an XKB server
//! exports: two groups, Shift and Lock within a pair, the Num Lock keypad rule,
//! and the third level reached through ISO_Level3_Shift (AltGr).
//!
//! Columns per keycode, as laid out by the server:
//!
//! ```text
//! 0 1  group 1, levels 1-2
//! 2 3  group 2, levels 1-2
//! 4 5  group 1, levels 3-4
//! 6 7  group 2, levels 3-4
//! ```

use veil_core::keysym::{
    self, Keysym, NO_SYMBOL, XK_ISO_LEVEL3_SHIFT, XK_MODE_SWITCH, XK_NUM_LOCK,
};

pub const SHIFT_MASK: u16 = 1 << 0;
pub const LOCK_MASK: u16 = 1 << 1;
pub const CONTROL_MASK: u16 = 1 << 2;

/// XKB group index carried in key event state
const GROUP_SHIFT: u16 = 13;
const GROUP_BITS: u16 = 0b11;

/// Modifier bits bound to the keys that change how keycodes translate.
/// Zero means no key is bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModifierMasks {
    pub num_lock: u16,
    pub mode_switch: u16,
    pub level3: u16,
}

/// Snapshot of the server's keyboard mapping
#[derive(Clone, Debug)]
pub struct Keymap {
    min_keycode: u8,
    per_keycode: usize,
    keysyms: Vec<Keysym>,
    masks: ModifierMasks,
}

impl Keymap {
    /// Build from a `GetKeyboardMapping` reply and the modifier bindings
    pub fn new(min_keycode: u8, per_keycode: u8, keysyms: Vec<Keysym>, masks: ModifierMasks) -> Self {
        Self {
            min_keycode,
            per_keycode: usize::from(per_keycode),
            keysyms,
            masks,
        }
    }

    /// Find which modifiers Num Lock, Mode_switch and ISO_Level3_Shift are
    /// bound to.
    ///
    /// `modifiers` is the `GetModifierMapping` keycode table: eight rows of
    /// `per_modifier` keycodes, Shift first. Only Mod1..Mod5 are considered.
    pub fn find_modifier_masks(&self, modifiers: &[u8], per_modifier: usize) -> ModifierMasks {
        let mut masks = ModifierMasks::default();
        if per_modifier == 0 {
            return masks;
        }
        for (row, codes) in modifiers.chunks(per_modifier).enumerate().take(8).skip(3) {
            let bit = 1 << row;
            for &code in codes.iter().filter(|&&code| code != 0) {
                if self.binds(code, XK_NUM_LOCK) {
                    masks.num_lock |= bit;
                }
                if self.binds(code, XK_MODE_SWITCH) {
                    masks.mode_switch |= bit;
                }
                if self.binds(code, XK_ISO_LEVEL3_SHIFT) {
                    masks.level3 |= bit;
                }
            }
        }
        masks
    }

    pub fn with_modifier_masks(mut self, masks: ModifierMasks) -> Self {
        self.masks = masks;
        self
    }

    pub fn modifier_masks(&self) -> ModifierMasks {
        self.masks
    }

    fn binds(&self, keycode: u8, wanted: Keysym) -> bool {
        (0..self.per_keycode).any(|column| self.column(keycode, column) == wanted)
    }

    fn column(&self, keycode: u8, column: usize) -> Keysym {
        if keycode < self.min_keycode || column >= self.per_keycode {
            return NO_SYMBOL;
        }
        let index = usize::from(keycode - self.min_keycode) * self.per_keycode + column;
        self.keysyms.get(index).copied().unwrap_or(NO_SYMBOL)
    }

    /// Keysym for `keycode` with modifier `state`
    pub fn lookup(&self, keycode: u8, state: u16) -> Keysym {
        let (lower, upper) = self.active_pair(keycode, state);

        let shift = state & SHIFT_MASK != 0;
        let caps = state & LOCK_MASK != 0;
        let num_lock = self.masks.num_lock != 0 && state & self.masks.num_lock != 0;

        if num_lock && keysym::is_keypad_key(upper) {
            return if shift { lower } else { upper };
        }
        match (shift, caps) {
            (false, false) => lower,
            (false, true) => to_upper(lower),
            (true, false) => upper,
            (true, true) => to_upper(upper),
        }
    }

    /// The pair selected by group and level, falling back towards group 1
    /// level 1 when the server left the selected columns empty
    fn active_pair(&self, keycode: u8, state: u16) -> (Keysym, Keysym) {
        let group_two = (self.masks.mode_switch != 0 && state & self.masks.mode_switch != 0)
            || (state >> GROUP_SHIFT) & GROUP_BITS != 0;
        let level_three = self.masks.level3 != 0 && state & self.masks.level3 != 0;

        let candidates: &[usize] = match (group_two, level_three) {
            (false, false) => &[0],
            (true, false) => &[2, 0],
            (false, true) => &[4, 0],
            (true, true) => &[6, 4, 2, 0],
        };
        candidates
            .iter()
            .find_map(|&first| self.pair(keycode, first))
            .unwrap_or((NO_SYMBOL, NO_SYMBOL))
    }

    /// The keysym pair starting at column `first`, with the single-keysym
    /// rule applied, or `None` when both are empty
    fn pair(&self, keycode: u8, first: usize) -> Option<(Keysym, Keysym)> {
        let lower = self.column(keycode, first);
        let upper = self.column(keycode, first + 1);
        if lower == NO_SYMBOL && upper == NO_SYMBOL {
            return None;
        }
        if upper != NO_SYMBOL {
            return Some((lower, upper));
        }
        let (folded, raised) = (to_lower(lower), to_upper(lower));
        if folded != raised {
            Some((folded, raised))
        } else {
            Some((lower, lower))
        }
    }

    /// Translate a key event into the keysym and the bytes it types
    pub fn translate(&self, keycode: u8, state: u16) -> (Keysym, Vec<u8>) {
        let keysym = self.lookup(keycode, state);
        let Some(mut c) = keysym::keysym_to_char(keysym) else {
            return (keysym, Vec::new());
        };
        if state & CONTROL_MASK != 0 && ('@'..='~').contains(&c) {
            c = char::from(c as u8 & 0x1f);
        }
        let mut utf8 = [0u8; 4];
        (keysym, c.encode_utf8(&mut utf8).as_bytes().to_vec())
    }
}

/// Latin-1 letters only; other keysyms come back unchanged
fn to_upper(keysym: Keysym) -> Keysym {
    match keysym {
        0x61..=0x7a => keysym - 0x20,
        0xe0..=0xfe if keysym != 0xf7 => keysym - 0x20,
        _ => keysym,
    }
}

fn to_lower(keysym: Keysym) -> Keysym {
    match keysym {
        0x41..=0x5a => keysym + 0x20,
        0xc0..=0xde if keysym != 0xd7 => keysym + 0x20,
        _ => keysym,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::keysym::{XK_KP_0, XK_RETURN};

    const XK_KP_INSERT: Keysym = 0xff9e;
    const MOD2: u16 = 1 << 4;
    const MOD5: u16 = 1 << 7;

    /// Keycodes 8..: `a`, `1 !`, keypad `Insert 0`, Return, Num Lock
    #[rustfmt::skip]
    fn keymap() -> Keymap {
        Keymap::new(
            8,
            2,
            vec![
                0x61, NO_SYMBOL,
                0x31, 0x21,
                XK_KP_INSERT, XK_KP_0,
                XK_RETURN, NO_SYMBOL,
                XK_NUM_LOCK, NO_SYMBOL,
            ],
            ModifierMasks::default(),
        )
    }

    /// Eight columns per keycode, as an XKB server exports them.
    /// Keycodes 8..: `q` (AltGr `@`), `e` (group 2 Cyrillic `у`, AltGr `€`),
    /// ISO_Level3_Shift, Mode_switch, `1 !` with nothing beyond group 1
    #[rustfmt::skip]
    fn xkb_keymap() -> Keymap {
        const CYRILLIC_U: Keysym = 0x6d5;
        const CYRILLIC_CAPITAL_U: Keysym = 0x6f5;
        const EURO: Keysym = 0x20ac;
        Keymap::new(
            8,
            8,
            vec![
                0x71, 0x51, NO_SYMBOL, NO_SYMBOL, 0x40, 0x7a9, NO_SYMBOL, NO_SYMBOL,
                0x65, 0x45, CYRILLIC_U, CYRILLIC_CAPITAL_U, EURO, NO_SYMBOL, NO_SYMBOL, NO_SYMBOL,
                XK_ISO_LEVEL3_SHIFT, NO_SYMBOL, XK_ISO_LEVEL3_SHIFT, NO_SYMBOL,
                    NO_SYMBOL, NO_SYMBOL, NO_SYMBOL, NO_SYMBOL,
                XK_MODE_SWITCH, NO_SYMBOL, NO_SYMBOL, NO_SYMBOL,
                    NO_SYMBOL, NO_SYMBOL, NO_SYMBOL, NO_SYMBOL,
                0x31, 0x21, NO_SYMBOL, NO_SYMBOL, NO_SYMBOL, NO_SYMBOL, NO_SYMBOL, NO_SYMBOL,
            ],
            ModifierMasks::default(),
        )
    }

    /// Mod5 holds ISO_Level3_Shift (keycode 10), Mod3 holds Mode_switch (keycode 11)
    fn xkb_masks(map: &Keymap) -> ModifierMasks {
        map.find_modifier_masks(&[0, 0, 0, 0, 0, 11, 0, 10], 1)
    }

    #[test]
    fn test_single_keysym_letters_get_case() {
        let map = keymap();
        assert_eq!(map.lookup(8, 0), 0x61);
        assert_eq!(map.lookup(8, SHIFT_MASK), 0x41);
        assert_eq!(map.lookup(8, LOCK_MASK), 0x41);
    }

    #[test]
    fn test_shifted_column() {
        let map = keymap();
        assert_eq!(map.lookup(9, 0), 0x31);
        assert_eq!(map.lookup(9, SHIFT_MASK), 0x21);
        // Caps Lock leaves non-letters alone.
        assert_eq!(map.lookup(9, LOCK_MASK), 0x31);
    }

    #[test]
    fn test_num_lock_selects_keypad_digit() {
        let map = keymap();
        let masks = map.find_modifier_masks(&[0, 0, 0, 0, 12, 0, 0, 0], 1);
        assert_eq!(masks.num_lock, MOD2);

        let map = map.with_modifier_masks(masks);
        assert_eq!(map.lookup(10, 0), XK_KP_INSERT);
        assert_eq!(map.lookup(10, MOD2), XK_KP_0);
        assert_eq!(map.lookup(10, MOD2 | SHIFT_MASK), XK_KP_INSERT);
    }

    #[test]
    fn test_no_modifier_bindings() {
        let map = keymap();
        assert_eq!(map.find_modifier_masks(&[8, 9, 0, 0, 0, 0, 0, 0], 1), ModifierMasks::default());
        assert_eq!(map.find_modifier_masks(&[], 0), ModifierMasks::default());
        // Num Lock on Shift's row is not a Num Lock modifier.
        assert_eq!(map.find_modifier_masks(&[12, 0, 0, 0, 0, 0, 0, 0], 1).num_lock, 0);
    }

    #[test]
    fn test_level_three_modifier_found() {
        let map = xkb_keymap();
        let masks = xkb_masks(&map);
        assert_eq!(masks.level3, MOD5);
        assert_eq!(masks.mode_switch, 1 << 5);
        assert_eq!(masks.num_lock, 0);
    }

    #[test]
    fn test_altgr_types_third_level() {
        let map = xkb_keymap();
        let map = map.clone().with_modifier_masks(xkb_masks(&map));

        assert_eq!(map.translate(8, 0), (0x71, b"q".to_vec()));
        assert_eq!(map.translate(8, MOD5), (0x40, b"@".to_vec()));
        assert_eq!(map.lookup(8, MOD5 | SHIFT_MASK), 0x7a9);
        assert_eq!(map.lookup(9, MOD5), 0x20ac);
        // Nothing on level 3: stays on the base pair.
        assert_eq!(map.lookup(12, MOD5), 0x31);
        assert_eq!(map.lookup(12, MOD5 | SHIFT_MASK), 0x21);
    }

    #[test]
    fn test_second_group_selection() {
        let map = xkb_keymap();
        let masks = xkb_masks(&map);
        let map = map.clone().with_modifier_masks(masks);

        // Group index in the event state.
        assert_eq!(map.lookup(9, 1 << GROUP_SHIFT), 0x6d5);
        assert_eq!(map.lookup(9, 1 << GROUP_SHIFT | SHIFT_MASK), 0x6f5);
        // Mode_switch modifier.
        assert_eq!(map.lookup(9, masks.mode_switch), 0x6d5);
        // Group 2 with an empty pair falls back to group 1.
        assert_eq!(map.lookup(8, 1 << GROUP_SHIFT), 0x71);
        // Group 2 level 3 empty everywhere but group 1 level 3.
        assert_eq!(map.lookup(9, 1 << GROUP_SHIFT | MOD5), 0x20ac);
    }

    #[test]
    fn test_out_of_range_keycodes() {
        let map = keymap();
        assert_eq!(map.lookup(3, 0), NO_SYMBOL);
        assert_eq!(map.lookup(200, 0), NO_SYMBOL);
        assert!(map.translate(200, 0).1.is_empty());
    }

    #[test]
    fn test_translate_text() {
        let map = keymap();
        assert_eq!(map.translate(8, 0), (0x61, b"a".to_vec()));
        assert_eq!(map.translate(9, SHIFT_MASK), (0x21, b"!".to_vec()));
        assert_eq!(map.translate(11, 0), (XK_RETURN, b"\r".to_vec()));
        // Control folds letters onto control characters.
        assert_eq!(map.translate(8, CONTROL_MASK), (0x61, vec![0x01]));
    }
}
