//! Bluetooth Module
//!
//! Drives the EmulStick dongle over its vendor GATT service.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   EmulStickService                       │
//! │     (Main coordinator - public API for callers)          │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!     ┌──────────┬──────┴──────┬──────────────┐
//!     ▼          ▼             ▼              ▼
//! ┌─────────┐ ┌─────────┐ ┌───────────┐ ┌───────────┐
//! │ Scanner │ │ Session │ │ Scheduler │ │ Protocol  │
//! │         │ │         │ │           │ │           │
//! │ - BLE   │ │ - Auth  │ │ - FIFO    │ │ - UUIDs   │
//! │  discovery│ │ - Device│ │ - Pacing │ │ - Opcodes │
//! │         │ │   info  │ │ - Gating  │ │ - Parsing │
//! └─────────┘ └─────────┘ └───────────┘ └───────────┘
//! ```
//!
//! ## Modules
//!
//! - [`transport`] - injected platform seam (GATT link + central)
//! - [`protocol`] - characteristic ids, opcodes and command builders
//! - [`auth`] - challenge/response cipher and hardware classification
//! - [`scheduler`] - the serialized command queue
//! - [`scanner`] - dongle discovery
//! - [`session`] - connect/subscribe/read/authenticate pipeline
//! - [`led`] - host LED feedback decoding
//! - [`service`] - main service coordinator

pub mod auth;
pub mod led;
pub mod protocol;
pub mod scanner;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod transport;

// Re-export main service for convenience
pub use service::EmulStickService;
