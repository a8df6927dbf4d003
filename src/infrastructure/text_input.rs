//! Multi-strategy text input.
//!
//! BLE HID cannot carry Unicode directly, so each character is classified
//! and routed: dedicated keys for `\n`/`\t`, the direct HID table for
//! printable ASCII, and one of three unicode strategies depending on the
//! dongle generation and the user's configured mode. Every strategy emits
//! plain `QueuedAction` batches; pacing and ordering are the scheduler's
//! job, not ours.

use tracing::{debug, warn};

use crate::domain::keymap::{self, ascii_to_hid, classify, keypad_digit, CharClass};
use crate::domain::models::{
    CharacteristicId, HardwareType, LedStatus, QueuedAction, TextInputMode,
};
use crate::domain::reports::KeyboardReport;

/// Pacing between individual keystrokes of a macro.
pub const KEY_PULSE_DELAY_MS: u64 = 12;
/// Pacing per character on the modern unicode characteristic.
pub const UNICODE_CHAR_DELAY_MS: u64 = 20;
/// Settle time for the host OS to perform an Alt+X / Alt-code conversion
/// (and for a synthesized NumLock toggle to take effect).
pub const CONVERSION_SETTLE_MS: u64 = 50;

pub struct TextInputEngine {
    hardware: HardwareType,
    mode: TextInputMode,
}

impl TextInputEngine {
    pub fn new(hardware: HardwareType, mode: TextInputMode) -> Self {
        Self { hardware, mode }
    }

    /// Encode a whole string. Unmappable characters are skipped with a
    /// warning; a partially encodable string still delivers the rest.
    ///
    /// `leds` is the host LED state at call time; the Big5 path needs to
    /// know whether NumLock is already on.
    pub fn encode_str(&self, text: &str, leds: LedStatus) -> Vec<QueuedAction> {
        let mut actions = Vec::new();
        // A synthesized toggle flips it once for the rest of the string.
        let mut num_lock_on = leds.num_lock;
        for c in text.chars() {
            self.encode_char(c, &mut num_lock_on, &mut actions);
        }
        actions
    }

    fn encode_char(&self, c: char, num_lock_on: &mut bool, out: &mut Vec<QueuedAction>) {
        match classify(c) {
            CharClass::Control => match c {
                '\n' => pulse_key(0, keymap::usage::ENTER, out),
                '\t' => pulse_key(0, keymap::usage::TAB, out),
                '\r' => debug!("carriage return skipped"),
                other => debug!(?other, "control character has no key, skipped"),
            },
            CharClass::Ascii => {
                // The table covers all of 0x20..=0x7E.
                if let Some((modifiers, usage)) = ascii_to_hid(c) {
                    pulse_key(modifiers, usage, out);
                }
            }
            CharClass::NonAscii => {
                if self.hardware.supports_unicode_channel() {
                    self.encode_unicode_channel(c, out);
                } else {
                    match self.mode {
                        TextInputMode::AltXUnicode => self.encode_alt_x(c, out),
                        TextInputMode::Big5AltCode => self.encode_big5(c, num_lock_on, out),
                    }
                }
            }
        }
    }

    /// Modern path: the raw code point, 32-bit little-endian, on the
    /// dedicated unicode characteristic. No host-side macro needed.
    fn encode_unicode_channel(&self, c: char, out: &mut Vec<QueuedAction>) {
        out.push(QueuedAction::write(
            CharacteristicId::UnicodeText,
            (c as u32).to_le_bytes().to_vec(),
        ));
        out.push(QueuedAction::delay(UNICODE_CHAR_DELAY_MS));
    }

    /// Legacy path: type the 4 hex digits of each UTF-16 code unit, then
    /// the Alt+X chord, and give the host editor time to convert.
    fn encode_alt_x(&self, c: char, out: &mut Vec<QueuedAction>) {
        let mut units = [0u16; 2];
        for unit in c.encode_utf16(&mut units) {
            for hex in format!("{unit:04x}").chars() {
                if let Some((modifiers, usage)) = ascii_to_hid(hex) {
                    pulse_key(modifiers, usage, out);
                }
            }
            // Press X with Alt held, release X, release Alt.
            push_report(
                KeyboardReport::key(keymap::modifier::LEFT_ALT, keymap::usage::X),
                out,
            );
            push_report(KeyboardReport::modifiers_only(keymap::modifier::LEFT_ALT), out);
            push_report(KeyboardReport::EMPTY, out);
            out.push(QueuedAction::delay(CONVERSION_SETTLE_MS));
        }
    }

    /// Deprecated fallback: the classic "hold Alt, type the decimal code
    /// on the numeric keypad, release Alt" macro over the character's Big5
    /// double-byte code. Requires NumLock; toggles it on if needed.
    fn encode_big5(&self, c: char, num_lock_on: &mut bool, out: &mut Vec<QueuedAction>) {
        let Some(code) = big5_code(c) else {
            warn!(?c, "not representable in Big5, skipped");
            return;
        };

        if !*num_lock_on {
            pulse_key(0, keymap::usage::NUM_LOCK, out);
            out.push(QueuedAction::delay(CONVERSION_SETTLE_MS));
            *num_lock_on = true;
        }

        push_report(KeyboardReport::modifiers_only(keymap::modifier::LEFT_ALT), out);
        for digit in code.to_string().bytes() {
            push_report(
                KeyboardReport::key(keymap::modifier::LEFT_ALT, keypad_digit(digit - b'0')),
                out,
            );
            push_report(KeyboardReport::modifiers_only(keymap::modifier::LEFT_ALT), out);
        }
        push_report(KeyboardReport::EMPTY, out);
        out.push(QueuedAction::delay(KEY_PULSE_DELAY_MS));
    }
}

/// Big5 double-byte code of `c`, big-endian, as the decimal Alt-code value.
/// `None` when the platform charset cannot map the character.
fn big5_code(c: char) -> Option<u16> {
    let mut buf = [0u8; 4];
    let s: &str = c.encode_utf8(&mut buf);
    let (bytes, _, had_errors) = encoding_rs::BIG5.encode(s);
    if had_errors {
        return None;
    }
    match bytes.as_ref() {
        [single] => Some(*single as u16),
        [lead, trail] => Some(u16::from_be_bytes([*lead, *trail])),
        _ => None,
    }
}

/// One keystroke as the firmware wants it: press, short delay, release.
fn pulse_key(modifiers: u8, usage: u8, out: &mut Vec<QueuedAction>) {
    push_report(KeyboardReport::key(modifiers, usage), out);
    push_report(KeyboardReport::EMPTY, out);
}

fn push_report(report: KeyboardReport, out: &mut Vec<QueuedAction>) {
    out.push(QueuedAction::write(
        CharacteristicId::Keyboard,
        report.encode().to_vec(),
    ));
    out.push(QueuedAction::delay(KEY_PULSE_DELAY_MS));
}
