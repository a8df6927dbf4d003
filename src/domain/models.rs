//! Core value types shared across the dongle control engine.

use serde::{Deserialize, Serialize};

/// Phase of the connection lifecycle, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Scanning,
    Connecting,
    Authenticating,
    Connected,
    Error,
}

/// Dongle generation, derived from the hardware-version string (and from
/// the presence of the unicode-text characteristic, which only modern
/// firmware exposes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HardwareType {
    /// TI CC2650-based first generation.
    LegacyTi,
    /// WCH CH582-based revision.
    LegacyWch,
    /// ESP32-S3 generation with the dedicated unicode characteristic.
    ModernUnicodeCapable,
    /// Unrecognized firmware string; treated as legacy (safest fallback).
    #[default]
    Unknown,
}

impl HardwareType {
    /// Modern dongles accept raw code points on the unicode characteristic;
    /// everything else needs a host-side keystroke macro.
    pub fn supports_unicode_channel(self) -> bool {
        matches!(self, HardwareType::ModernUnicodeCapable)
    }
}

/// USB identity the dongle currently presents to the host PC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceMode {
    /// Keyboard + mouse composite device.
    Composite,
    /// Xbox-360 controller (XInput).
    XInput,
    /// Single-keyboard identity (a specific Microsoft keyboard VID/PID).
    SingleKeyboard,
    #[default]
    Unknown,
}

/// Which mode-switch command form the dongle's firmware understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSwitchKind {
    /// `0x40` legacy form, earliest TI firmware only.
    SetCommon,
    /// `0x50` form carrying an explicit VID/PID.
    SetEmulDevice,
    /// `0x51` form, WCH firmware.
    SetComposite,
}

/// Vendor identity derived from the PnP ID characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorInfo {
    pub name: &'static str,
    pub vid: u16,
    pub switch_kind: ModeSwitchKind,
}

/// A device seen during discovery (or recalled from the bond list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedDevice {
    pub name: String,
    pub address: u64,
    pub signal_strength: i16,
    /// Bonded dongles stop advertising once paired, so they are merged
    /// into scan results without having been seen on air.
    pub bonded: bool,
}

/// Vendor GATT characteristics plus the standard device-information set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicId {
    /// `F801`, keyboard reports out / LED state in.
    Keyboard,
    /// `F802`, optional direct-text channel.
    DirectText,
    /// `F803`, mouse reports.
    Mouse,
    /// `F805`, optional unicode-text channel (modern hardware only).
    UnicodeText,
    /// `F80F`, vendor command channel.
    Command,
    /// `2A23` System ID (8 bytes).
    SystemId,
    /// `2A26` Firmware Revision String.
    FirmwareVersion,
    /// `2A27` Hardware Revision String.
    HardwareVersion,
    /// `2A28` Software Revision String.
    SoftwareVersion,
    /// `2A50` PnP ID (7 bytes).
    PnpId,
}

/// One unit of work for the command scheduler. Immutable once enqueued;
/// owned exclusively by the scheduler until consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedAction {
    Write {
        characteristic: CharacteristicId,
        payload: Vec<u8>,
    },
    Delay {
        millis: u64,
    },
}

impl QueuedAction {
    pub fn write(characteristic: CharacteristicId, payload: impl Into<Vec<u8>>) -> Self {
        QueuedAction::Write {
            characteristic,
            payload: payload.into(),
        }
    }

    pub fn delay(millis: u64) -> Self {
        QueuedAction::Delay { millis }
    }
}

/// Host-PC lock-key LED state, decoded from keyboard-channel notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedStatus {
    pub num_lock: bool,
    pub caps_lock: bool,
    pub scroll_lock: bool,
}

impl LedStatus {
    pub fn from_bitmask(mask: u8) -> Self {
        Self {
            num_lock: mask & 0x01 != 0,
            caps_lock: mask & 0x02 != 0,
            scroll_lock: mask & 0x04 != 0,
        }
    }
}

/// User-selected text strategy for legacy hardware. Modern dongles ignore
/// this and use the unicode characteristic directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextInputMode {
    /// Type the hex code unit then Alt+X (Windows editor convention).
    #[default]
    AltXUnicode,
    /// Deprecated Big5 Alt-code fallback (hold Alt, keypad decimal digits).
    Big5AltCode,
}

/// Mouse buttons as HID bit positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn mask(self) -> u8 {
        match self {
            MouseButton::Left => 0x01,
            MouseButton::Right => 0x02,
            MouseButton::Middle => 0x04,
        }
    }
}

/// State accumulated over one connection attempt. Created when the connect
/// starts, filled in by the handshake, dropped on disconnect.
#[derive(Debug, Clone)]
pub struct Session {
    pub address: u64,
    pub name: String,
    pub system_id: [u8; 8],
    pub firmware_version: String,
    pub hardware_version: String,
    pub software_version: String,
    pub pnp_id: Option<[u8; 7]>,
    pub hardware_type: HardwareType,
    pub vendor: VendorInfo,
    pub device_mode: DeviceMode,
}
