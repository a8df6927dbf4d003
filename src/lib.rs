//! Control engine for the EmulStick BLE HID dongle.
//!
//! A handheld device acts as a wireless keyboard, mouse and Xbox-360-style
//! gamepad for a PC by driving the dongle over its vendor GATT protocol.
//! This crate is the platform-free core: the serialized command queue, the
//! authentication handshake, the fixed-layout HID report codecs, the
//! multi-strategy text encoder and the device-mode-switch protocol. The
//! platform BLE stack is injected through the traits in
//! [`infrastructure::bluetooth::transport`]; presentation and persistence
//! of saved devices live in the consuming application.

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use domain::models::{
    ConnectionPhase, DeviceMode, HardwareType, LedStatus, MouseButton, ScannedDevice,
    TextInputMode,
};
pub use domain::reports::{DpadDirection, GamepadButton, GamepadReport};
pub use error::{AuthError, SessionError, TransportError};
pub use infrastructure::bluetooth::transport::{BleCentral, GattTransport};
pub use infrastructure::bluetooth::EmulStickService;
