//! Platform-free domain layer: value types, HID codecs, key tables and
//! persisted settings.

pub mod keymap;
pub mod models;
pub mod reports;
pub mod settings;
