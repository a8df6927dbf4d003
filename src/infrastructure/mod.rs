//! Infrastructure layer: logging setup, the BLE protocol stack and the
//! text-input strategy engine.

pub mod bluetooth;
pub mod logging;
pub mod text_input;
