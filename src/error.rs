//! Typed errors for the dongle control engine.
//!
//! The transport/auth/session layers return these; the service layer wraps
//! them in `anyhow` for callers.

use std::time::Duration;

use thiserror::Error;

use crate::domain::models::CharacteristicId;

/// Failures surfaced by the injected GATT transport adapter.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("GATT write to {0:?} failed: {1}")]
    Write(CharacteristicId, String),

    #[error("GATT read of {0:?} failed: {1}")]
    Read(CharacteristicId, String),

    #[error("notification subscription for {0:?} failed: {1}")]
    Subscribe(CharacteristicId, String),

    #[error("device discovery failed: {0}")]
    Discovery(String),

    #[error("connection attempt failed: {0}")]
    Connect(String),

    #[error("link lost")]
    Disconnected,
}

/// Failures of the challenge/response handshake. All of these are fatal:
/// the session is torn down and never silently retried.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("software version {0:?} has no authentication entry")]
    UnsupportedVersion(String),

    #[error("dongle ciphertext does not match the expected proof")]
    CiphertextMismatch,

    #[error("device information characteristic {0:?} returned {1} bytes")]
    MalformedDeviceInfo(CharacteristicId, usize),

    #[error("no challenge response within {0:?}")]
    ChallengeTimeout(Duration),

    #[error("command channel closed during handshake")]
    ChannelClosed,
}

/// Failures of session establishment.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("required characteristic {0:?} is missing")]
    MissingCharacteristic(CharacteristicId),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}
