//! Fixed-layout HID report codecs for the dongle's vendor characteristics.
//!
//! All encoders here are pure; the only stateful piece is [`GamepadReport`],
//! an explicit value type whose whole 20-byte buffer is retransmitted on
//! every change (the firmware expects full-state gamepad reports).

/// Mouse report size in bytes.
pub const MOUSE_REPORT_SIZE: usize = 6;
/// Keyboard report size in bytes.
pub const KEYBOARD_REPORT_SIZE: usize = 8;
/// Gamepad report size in bytes.
pub const GAMEPAD_REPORT_SIZE: usize = 20;

/// Largest per-report pointer displacement the 12-bit-ish wire field takes.
pub const MOUSE_DELTA_MAX: i32 = 2047;
/// Wheel delta limit.
pub const MOUSE_WHEEL_MAX: i32 = 15;

/// Encode one mouse report: `[buttons, dxLo, dxHi, dyLo, dyHi, wheel]`.
///
/// dx/dy are clamped (not wrapped) to ±2047 and stored little-endian;
/// wheel is clamped to ±15.
pub fn build_mouse_report(buttons: u8, dx: i32, dy: i32, wheel: i32) -> [u8; MOUSE_REPORT_SIZE] {
    let dx = dx.clamp(-MOUSE_DELTA_MAX, MOUSE_DELTA_MAX) as i16;
    let dy = dy.clamp(-MOUSE_DELTA_MAX, MOUSE_DELTA_MAX) as i16;
    let wheel = wheel.clamp(-MOUSE_WHEEL_MAX, MOUSE_WHEEL_MAX) as i8;

    let dx = dx.to_le_bytes();
    let dy = dy.to_le_bytes();
    [buttons, dx[0], dx[1], dy[0], dy[1], wheel as u8]
}

/// Split an oversized pointer move into `floor(max/2047)+1` equal reports.
///
/// Integer division per part; the residual drift of a few counts is
/// accepted rather than emitting a correction report.
pub fn split_mouse_move(dx: i32, dy: i32, buttons: u8) -> Vec<[u8; MOUSE_REPORT_SIZE]> {
    let max = dx.abs().max(dy.abs());
    if max <= MOUSE_DELTA_MAX {
        return vec![build_mouse_report(buttons, dx, dy, 0)];
    }

    let parts = (max / MOUSE_DELTA_MAX + 1) as usize;
    let step_x = dx / parts as i32;
    let step_y = dy / parts as i32;
    (0..parts)
        .map(|_| build_mouse_report(buttons, step_x, step_y, 0))
        .collect()
}

/// One 8-byte keyboard report: `[modifiers, 0, key0..key5]`.
///
/// The transmission model is "pulse": a non-empty report is normally
/// followed by [`KeyboardReport::EMPTY`] after a short delay, unless the
/// caller explicitly holds the state (drag) and releases later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyboardReport {
    pub modifiers: u8,
    pub keys: [u8; 6],
}

impl KeyboardReport {
    /// The all-released report.
    pub const EMPTY: Self = Self {
        modifiers: 0,
        keys: [0; 6],
    };

    /// A single key with optional modifiers.
    pub fn key(modifiers: u8, keycode: u8) -> Self {
        Self {
            modifiers,
            keys: [keycode, 0, 0, 0, 0, 0],
        }
    }

    /// Modifiers held with no keys down (e.g. the Alt-hold of an Alt-code
    /// macro, or releasing a key while keeping the modifier).
    pub fn modifiers_only(modifiers: u8) -> Self {
        Self {
            modifiers,
            keys: [0; 6],
        }
    }

    /// Up to six simultaneous keycodes; extras are dropped.
    pub fn chord(modifiers: u8, keycodes: &[u8]) -> Self {
        let mut keys = [0u8; 6];
        for (slot, &code) in keys.iter_mut().zip(keycodes) {
            *slot = code;
        }
        Self { modifiers, keys }
    }

    pub fn encode(&self) -> [u8; KEYBOARD_REPORT_SIZE] {
        let k = &self.keys;
        [self.modifiers, 0, k[0], k[1], k[2], k[3], k[4], k[5]]
    }
}

/// D-pad direction nibble of the Xbox-360 report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DpadDirection {
    #[default]
    Center = 0x0,
    Up = 0x1,
    UpRight = 0x2,
    Right = 0x4,
    DownRight = 0x5,
    UpLeft = 0x6,
    Down = 0x8,
    DownLeft = 0x9,
    Left = 0xA,
}

/// Xbox-360 gamepad buttons, split across report bytes 2 and 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamepadButton {
    A,
    B,
    X,
    Y,
    LeftBumper,
    RightBumper,
    Back,
    Start,
    LeftThumb,
    RightThumb,
}

impl GamepadButton {
    /// (report byte index, bit mask) for this button.
    fn slot(self) -> (usize, u8) {
        match self {
            GamepadButton::Start => (2, 1 << 4),
            GamepadButton::Back => (2, 1 << 5),
            GamepadButton::RightThumb => (2, 1 << 6),
            GamepadButton::LeftThumb => (2, 1 << 7),
            GamepadButton::LeftBumper => (3, 1 << 0),
            GamepadButton::RightBumper => (3, 1 << 1),
            GamepadButton::A => (3, 1 << 4),
            GamepadButton::B => (3, 1 << 5),
            GamepadButton::Y => (3, 1 << 6),
            GamepadButton::X => (3, 1 << 7),
        }
    }
}

/// Persistent 20-byte Xbox-360 report buffer.
///
/// The caller owns the value and passes it back for each mutation; every
/// setter updates the buffer in place and the service retransmits all 20
/// bytes, matching the dongle's full-state wire behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GamepadReport {
    buf: [u8; GAMEPAD_REPORT_SIZE],
}

impl Default for GamepadReport {
    fn default() -> Self {
        let mut buf = [0u8; GAMEPAD_REPORT_SIZE];
        buf[1] = 0x14; // report length marker, fixed by the layout
        Self { buf }
    }
}

impl GamepadReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_button(&mut self, button: GamepadButton, pressed: bool) {
        let (idx, mask) = button.slot();
        if pressed {
            self.buf[idx] |= mask;
        } else {
            self.buf[idx] &= !mask;
        }
    }

    /// Replaces the D-pad nibble, preserving the button bits of byte 2.
    pub fn set_dpad(&mut self, direction: DpadDirection) {
        self.buf[2] = (self.buf[2] & 0xF0) | direction as u8;
    }

    pub fn set_left_trigger(&mut self, value: u8) {
        self.buf[4] = value;
    }

    pub fn set_right_trigger(&mut self, value: u8) {
        self.buf[5] = value;
    }

    /// Left stick; Y is negated before encoding (wire Y grows downward).
    pub fn set_left_stick(&mut self, x: i16, y: i16) {
        self.buf[6..8].copy_from_slice(&x.to_le_bytes());
        self.buf[8..10].copy_from_slice(&y.saturating_neg().to_le_bytes());
    }

    pub fn set_right_stick(&mut self, x: i16, y: i16) {
        self.buf[10..12].copy_from_slice(&x.to_le_bytes());
        self.buf[12..14].copy_from_slice(&y.saturating_neg().to_le_bytes());
    }

    pub fn as_bytes(&self) -> &[u8; GAMEPAD_REPORT_SIZE] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mouse_report_clamps_not_wraps() {
        let r = build_mouse_report(0, 5000, -5000, 100);
        assert_eq!(i16::from_le_bytes([r[1], r[2]]), 2047);
        assert_eq!(i16::from_le_bytes([r[3], r[4]]), -2047);
        assert_eq!(r[5] as i8, 15);

        let r = build_mouse_report(0x01, -3, 7, -100);
        assert_eq!(r[0], 0x01);
        assert_eq!(i16::from_le_bytes([r[1], r[2]]), -3);
        assert_eq!(i16::from_le_bytes([r[3], r[4]]), 7);
        assert_eq!(r[5] as i8, -15);
    }

    #[test]
    fn mouse_report_is_deterministic() {
        assert_eq!(
            build_mouse_report(2, 100, -200, 3),
            build_mouse_report(2, 100, -200, 3)
        );
    }

    #[test]
    fn split_keeps_small_moves_whole() {
        let reports = split_mouse_move(2047, -2047, 0);
        assert_eq!(reports.len(), 1);
    }

    #[test]
    fn split_divides_oversized_moves() {
        let reports = split_mouse_move(5000, 0, 0);
        assert_eq!(reports.len(), 3);

        let mut sum = 0i32;
        for r in &reports {
            let dx = i16::from_le_bytes([r[1], r[2]]) as i32;
            assert!(dx.abs() <= MOUSE_DELTA_MAX);
            sum += dx;
        }
        // Integer division drift: 3 * 1666 = 4998.
        assert!((5000 - sum).abs() < 3);
    }

    #[test]
    fn keyboard_report_layout() {
        let r = KeyboardReport::key(0x02, 0x04).encode();
        assert_eq!(r, [0x02, 0x00, 0x04, 0, 0, 0, 0, 0]);
        assert_eq!(KeyboardReport::EMPTY.encode(), [0u8; 8]);

        let chord = KeyboardReport::chord(0x01, &[0x04, 0x05, 0x06]).encode();
        assert_eq!(&chord[2..5], &[0x04, 0x05, 0x06]);
    }

    #[test]
    fn keyboard_chord_drops_extras() {
        let r = KeyboardReport::chord(0, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(r.keys, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn gamepad_header_and_buttons() {
        let mut pad = GamepadReport::new();
        assert_eq!(pad.as_bytes()[0], 0x00);
        assert_eq!(pad.as_bytes()[1], 0x14);

        pad.set_button(GamepadButton::A, true);
        pad.set_button(GamepadButton::X, true);
        assert_eq!(pad.as_bytes()[3], (1 << 4) | (1 << 7));

        pad.set_button(GamepadButton::A, false);
        assert_eq!(pad.as_bytes()[3], 1 << 7);

        pad.set_button(GamepadButton::Back, true);
        pad.set_button(GamepadButton::LeftThumb, true);
        assert_eq!(pad.as_bytes()[2], (1 << 5) | (1 << 7));
    }

    #[test]
    fn gamepad_dpad_preserves_button_bits() {
        let mut pad = GamepadReport::new();
        pad.set_button(GamepadButton::Start, true);
        pad.set_dpad(DpadDirection::UpLeft);
        assert_eq!(pad.as_bytes()[2], (1 << 4) | 0x6);
        pad.set_dpad(DpadDirection::Center);
        assert_eq!(pad.as_bytes()[2], 1 << 4);
    }

    #[test]
    fn gamepad_sticks_negate_y() {
        let mut pad = GamepadReport::new();
        pad.set_left_stick(1000, 2000);
        pad.set_right_stick(-1, i16::MIN);
        let b = pad.as_bytes();
        assert_eq!(i16::from_le_bytes([b[6], b[7]]), 1000);
        assert_eq!(i16::from_le_bytes([b[8], b[9]]), -2000);
        assert_eq!(i16::from_le_bytes([b[10], b[11]]), -1);
        // i16::MIN saturates instead of overflowing on negation.
        assert_eq!(i16::from_le_bytes([b[12], b[13]]), i16::MAX);
    }

    #[test]
    fn gamepad_triggers_and_reserved_tail() {
        let mut pad = GamepadReport::new();
        pad.set_left_trigger(0xFF);
        pad.set_right_trigger(0x80);
        let b = pad.as_bytes();
        assert_eq!(b[4], 0xFF);
        assert_eq!(b[5], 0x80);
        assert_eq!(&b[14..20], &[0u8; 6]);
    }
}
