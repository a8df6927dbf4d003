//! Host-PC LED feedback channel.
//!
//! The dongle forwards the host's keyboard output report on the keyboard
//! characteristic: a 1-byte bitmask (bit0 NumLock, bit1 CapsLock, bit2
//! ScrollLock). Consumers only see changes; the Big5 Alt-code text path
//! uses this to know whether NumLock must be toggled first.

use tokio::sync::watch;
use tracing::{debug, trace};

use crate::domain::models::LedStatus;

pub struct LedMonitor {
    tx: watch::Sender<LedStatus>,
}

impl LedMonitor {
    pub fn new() -> (Self, watch::Receiver<LedStatus>) {
        let (tx, rx) = watch::channel(LedStatus::default());
        (Self { tx }, rx)
    }

    /// Decode a keyboard-channel notification. Empty payloads are logged
    /// and ignored; equal states are suppressed.
    pub fn handle_notification(&self, payload: &[u8]) {
        let Some(&mask) = payload.first() else {
            debug!("empty LED notification ignored");
            return;
        };

        let status = LedStatus::from_bitmask(mask);
        self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                trace!(?status, "LED state changed");
                *current = status;
                true
            }
        });
    }

    pub fn current(&self) -> LedStatus {
        *self.tx.borrow()
    }
}
