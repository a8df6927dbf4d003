//! HID usage tables and character classification for text input.
//!
//! The ASCII map targets the US layout the dongle firmware assumes; anything
//! outside printable ASCII goes through one of the unicode strategies.

/// Modifier bit positions of keyboard report byte 0.
pub mod modifier {
    pub const LEFT_CTRL: u8 = 0x01;
    pub const LEFT_SHIFT: u8 = 0x02;
    pub const LEFT_ALT: u8 = 0x04;
    pub const LEFT_GUI: u8 = 0x08;
    pub const RIGHT_CTRL: u8 = 0x10;
    pub const RIGHT_SHIFT: u8 = 0x20;
    pub const RIGHT_ALT: u8 = 0x40;
    pub const RIGHT_GUI: u8 = 0x80;
}

/// HID usage codes referenced by the engine.
pub mod usage {
    pub const ENTER: u8 = 0x28;
    pub const TAB: u8 = 0x2B;
    pub const X: u8 = 0x1B;
    pub const NUM_LOCK: u8 = 0x53;
    /// Keypad 1..9 are contiguous; keypad 0 sits after keypad 9.
    pub const KEYPAD_1: u8 = 0x59;
    pub const KEYPAD_0: u8 = 0x62;
}

/// HID usage for a numeric keypad digit 0..=9.
pub fn keypad_digit(digit: u8) -> u8 {
    debug_assert!(digit <= 9);
    match digit {
        0 => usage::KEYPAD_0,
        d => usage::KEYPAD_1 + d - 1,
    }
}

/// Per-character routing decision of the text engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    /// Control characters; only `\n` and `\t` map to keys.
    Control,
    /// Printable ASCII 0x20..=0x7E, typed via the direct HID table.
    Ascii,
    /// Everything else; needs a unicode strategy.
    NonAscii,
}

pub fn classify(c: char) -> CharClass {
    match c {
        '\u{20}'..='\u{7E}' => CharClass::Ascii,
        c if (c as u32) < 0x20 || c == '\u{7F}' => CharClass::Control,
        _ => CharClass::NonAscii,
    }
}

/// Map a printable ASCII character to `(modifiers, usage)`.
///
/// Returns `None` outside 0x20..=0x7E.
pub fn ascii_to_hid(c: char) -> Option<(u8, u8)> {
    use modifier::LEFT_SHIFT as SHIFT;

    let pair = match c {
        'a'..='z' => (0, c as u8 - b'a' + 0x04),
        'A'..='Z' => (SHIFT, c.to_ascii_lowercase() as u8 - b'a' + 0x04),
        '1'..='9' => (0, c as u8 - b'1' + 0x1E),
        '0' => (0, 0x27),
        ' ' => (0, 0x2C),
        '-' => (0, 0x2D),
        '=' => (0, 0x2E),
        '[' => (0, 0x2F),
        ']' => (0, 0x30),
        '\\' => (0, 0x31),
        ';' => (0, 0x33),
        '\'' => (0, 0x34),
        '`' => (0, 0x35),
        ',' => (0, 0x36),
        '.' => (0, 0x37),
        '/' => (0, 0x38),
        '!' => (SHIFT, 0x1E),
        '@' => (SHIFT, 0x1F),
        '#' => (SHIFT, 0x20),
        '$' => (SHIFT, 0x21),
        '%' => (SHIFT, 0x22),
        '^' => (SHIFT, 0x23),
        '&' => (SHIFT, 0x24),
        '*' => (SHIFT, 0x25),
        '(' => (SHIFT, 0x26),
        ')' => (SHIFT, 0x27),
        '_' => (SHIFT, 0x2D),
        '+' => (SHIFT, 0x2E),
        '{' => (SHIFT, 0x2F),
        '}' => (SHIFT, 0x30),
        '|' => (SHIFT, 0x31),
        ':' => (SHIFT, 0x33),
        '"' => (SHIFT, 0x34),
        '~' => (SHIFT, 0x35),
        '<' => (SHIFT, 0x36),
        '>' => (SHIFT, 0x37),
        '?' => (SHIFT, 0x38),
        _ => return None,
    };
    Some(pair)
}
