//! Injected transport seam.
//!
//! The platform's BLE callback APIs stay outside the crate; the engine only
//! sees these two traits. `write` resolves when the platform delivers the
//! write-completion event, `subscribe` resolves once the CCCD write has
//! completed, and notification payloads arrive on the returned channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::models::{CharacteristicId, ScannedDevice};
use crate::error::TransportError;

/// One open GATT link to a dongle.
#[async_trait]
pub trait GattTransport: Send + Sync {
    /// Characteristics resolved during service discovery.
    async fn characteristics(&self) -> Result<Vec<CharacteristicId>, TransportError>;

    /// Write `payload` and await the transport-level completion event.
    async fn write(
        &self,
        characteristic: CharacteristicId,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    /// Read the current characteristic value.
    async fn read(&self, characteristic: CharacteristicId) -> Result<Vec<u8>, TransportError>;

    /// Enable notifications (CCCD write) and return the notification stream.
    /// Resolves only after the descriptor write has completed; callers rely
    /// on that to sequence CCCD writes.
    async fn subscribe(
        &self,
        characteristic: CharacteristicId,
    ) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, TransportError>;

    /// Tear the link down. Idempotent.
    async fn disconnect(&self);
}

/// Platform BLE central: discovery and link establishment.
#[async_trait]
pub trait BleCentral: Send + Sync {
    /// Advertisement scan for the given window.
    async fn scan(&self, window: Duration) -> Result<Vec<ScannedDevice>, TransportError>;

    /// Devices bonded with the platform, whether or not they advertise.
    async fn bonded_devices(&self) -> Result<Vec<ScannedDevice>, TransportError>;

    /// Open a link and request high connection priority.
    async fn connect(&self, address: u64) -> Result<Arc<dyn GattTransport>, TransportError>;
}
