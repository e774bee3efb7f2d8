//! Keyboard and mouse press-edge capability
//!
//! Key codes are Windows virtual-key numbers; names follow the lowercase
//! convention the binding schema uses (`lalt`, `f1`, `np_5`, `mouse1`).

use std::collections::HashSet;
use std::fmt;

/// Virtual-key code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(pub u32);

impl KeyCode {
    pub const MOUSE1: KeyCode = KeyCode(0x01);
    pub const MOUSE2: KeyCode = KeyCode(0x02);
    pub const MOUSE3: KeyCode = KeyCode(0x04);
    pub const MOUSE4: KeyCode = KeyCode(0x05);
    pub const MOUSE5: KeyCode = KeyCode(0x06);

    pub const ESCAPE: KeyCode = KeyCode(0x1B);

    pub const LSHIFT: KeyCode = KeyCode(0xA0);
    pub const RSHIFT: KeyCode = KeyCode(0xA1);
    pub const LCTRL: KeyCode = KeyCode(0xA2);
    pub const RCTRL: KeyCode = KeyCode(0xA3);
    pub const LALT: KeyCode = KeyCode(0xA4);
    pub const RALT: KeyCode = KeyCode(0xA5);

    pub const MODIFIERS: [KeyCode; 6] = [
        Self::LALT,
        Self::RALT,
        Self::LCTRL,
        Self::RCTRL,
        Self::LSHIFT,
        Self::RSHIFT,
    ];

    pub const MOUSE_BUTTONS: [KeyCode; 5] = [Self::MOUSE1, Self::MOUSE2, Self::MOUSE3, Self::MOUSE4, Self::MOUSE5];

    /// Letters and digits by their ASCII value
    pub fn from_char(c: char) -> Option<Self> {
        let c = c.to_ascii_uppercase();
        c.is_ascii_alphanumeric().then(|| KeyCode(c as u32))
    }

    pub fn is_modifier(self) -> bool {
        Self::MODIFIERS.contains(&self)
    }

    pub fn is_mouse(self) -> bool {
        Self::MOUSE_BUTTONS.contains(&self)
    }

    /// Binding-schema name, `None` for codes we don't bind
    pub fn name(self) -> Option<String> {
        let vk = self.0;
        let name = match vk {
            0x41..=0x5A | 0x30..=0x39 => char::from_u32(vk)?.to_ascii_lowercase().to_string(),
            0x60..=0x69 => format!("np_{}", vk - 0x60),
            0x70..=0x87 => format!("f{}", vk - 0x70 + 1),
            _ => NAMED_KEYS.iter().find(|(code, _)| *code == vk)?.1.to_string(),
        };
        Some(name)
    }

    /// Keyboard codes scanned while listening: everything nameable except
    /// modifiers, mouse buttons and Escape
    pub fn keyboard_scan() -> impl Iterator<Item = KeyCode> {
        (0x41..=0x5A)
            .chain(0x30..=0x39)
            .chain(0x70..=0x87)
            .chain(0x60..=0x69)
            .chain(NAMED_KEYS.iter().map(|(code, _)| *code))
            .map(KeyCode)
            .filter(|k| *k != Self::ESCAPE && !k.is_modifier() && !k.is_mouse())
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(&name),
            None => write!(f, "vk{:#04x}", self.0),
        }
    }
}

const NAMED_KEYS: &[(u32, &str)] = &[
    (0x01, "mouse1"),
    (0x02, "mouse2"),
    (0x04, "mouse3"),
    (0x05, "mouse4"),
    (0x06, "mouse5"),
    (0x08, "backspace"),
    (0x09, "tab"),
    (0x0D, "enter"),
    (0x13, "pause"),
    (0x14, "capslock"),
    (0x1B, "escape"),
    (0x20, "space"),
    (0x21, "pgup"),
    (0x22, "pgdn"),
    (0x23, "end"),
    (0x24, "home"),
    (0x25, "left"),
    (0x26, "up"),
    (0x27, "right"),
    (0x28, "down"),
    (0x2C, "print"),
    (0x2D, "insert"),
    (0x2E, "delete"),
    (0x6A, "np_multiply"),
    (0x6B, "np_add"),
    (0x6D, "np_subtract"),
    (0x6E, "np_period"),
    (0x6F, "np_divide"),
    (0x90, "numlock"),
    (0x91, "scrolllock"),
    (0xA0, "lshift"),
    (0xA1, "rshift"),
    (0xA2, "lctrl"),
    (0xA3, "rctrl"),
    (0xA4, "lalt"),
    (0xA5, "ralt"),
    (0xBA, "semicolon"),
    (0xBB, "equals"),
    (0xBC, "comma"),
    (0xBD, "minus"),
    (0xBE, "period"),
    (0xBF, "slash"),
    (0xC0, "grave"),
    (0xDB, "lbracket"),
    (0xDC, "backslash"),
    (0xDD, "rbracket"),
    (0xDE, "apostrophe"),
];

/// Press-edge queries for keyboard and mouse buttons.
///
/// `is_pressed` reports (and consumes) a press that happened since the
/// last query for that code. `clear_edge_state` drops all pending presses
/// so input typed before listening started is never reported.
pub trait KeyStateSource {
    fn is_pressed(&mut self, code: KeyCode) -> bool;

    fn is_held(&self, code: KeyCode) -> bool;

    fn clear_edge_state(&mut self);
}

/// [`KeyStateSource`] fed from a stream of key events
#[derive(Debug, Default)]
pub struct EventQueueKeys {
    held: HashSet<KeyCode>,
    edges: HashSet<KeyCode>,
}

impl EventQueueKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&mut self, code: KeyCode, pressed: bool) {
        if pressed {
            if self.held.insert(code) {
                self.edges.insert(code);
            }
        } else {
            self.held.remove(&code);
        }
    }

    /// Press and release in one go
    pub fn tap(&mut self, code: KeyCode) {
        self.push_event(code, true);
        self.push_event(code, false);
    }
}

impl KeyStateSource for EventQueueKeys {
    fn is_pressed(&mut self, code: KeyCode) -> bool {
        self.edges.remove(&code)
    }

    fn is_held(&self, code: KeyCode) -> bool {
        self.held.contains(&code)
    }

    fn clear_edge_state(&mut self) {
        self.edges.clear();
    }
}

/// Key source that never reports anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoKeys;

impl KeyStateSource for NoKeys {
    fn is_pressed(&mut self, _code: KeyCode) -> bool {
        false
    }

    fn is_held(&self, _code: KeyCode) -> bool {
        false
    }

    fn clear_edge_state(&mut self) {}
}

/// Names of the modifiers currently held, in canonical order
pub fn held_modifiers(keys: &dyn KeyStateSource) -> Vec<String> {
    KeyCode::MODIFIERS
        .iter()
        .filter(|code| keys.is_held(**code))
        .filter_map(|code| code.name())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(KeyCode(0x46).name().as_deref(), Some("f"));
        assert_eq!(KeyCode(0x35).name().as_deref(), Some("5"));
        assert_eq!(KeyCode(0x70).name().as_deref(), Some("f1"));
        assert_eq!(KeyCode(0x87).name().as_deref(), Some("f24"));
        assert_eq!(KeyCode(0x65).name().as_deref(), Some("np_5"));
        assert_eq!(KeyCode::LALT.name().as_deref(), Some("lalt"));
        assert_eq!(KeyCode::MOUSE2.name().as_deref(), Some("mouse2"));
        assert_eq!(KeyCode(0xFF).name(), None);
        assert_eq!(KeyCode::from_char('f'), Some(KeyCode(0x46)));
    }

    #[test]
    fn test_scan_excludes_modifiers_and_escape() {
        let scan: Vec<_> = KeyCode::keyboard_scan().collect();
        assert!(scan.contains(&KeyCode(0x41)));
        assert!(scan.contains(&KeyCode(0x20)));
        assert!(!scan.contains(&KeyCode::ESCAPE));
        assert!(!scan.contains(&KeyCode::LSHIFT));
        assert!(!scan.contains(&KeyCode::MOUSE1));
    }

    #[test]
    fn test_edges_are_consumed() {
        let mut keys = EventQueueKeys::new();
        keys.push_event(KeyCode(0x41), true);
        assert!(keys.is_held(KeyCode(0x41)));
        assert!(keys.is_pressed(KeyCode(0x41)));
        assert!(!keys.is_pressed(KeyCode(0x41)));

        // Repeat events while held are not new presses
        keys.push_event(KeyCode(0x41), true);
        assert!(!keys.is_pressed(KeyCode(0x41)));
    }

    #[test]
    fn test_clear_edge_state_keeps_held() {
        let mut keys = EventQueueKeys::new();
        keys.push_event(KeyCode::LALT, true);
        keys.tap(KeyCode(0x46));
        keys.clear_edge_state();

        assert!(!keys.is_pressed(KeyCode(0x46)));
        assert!(keys.is_held(KeyCode::LALT));
        assert_eq!(held_modifiers(&keys), vec!["lalt".to_string()]);
    }
}
