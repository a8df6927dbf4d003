//! Session establishment: characteristic discovery, sequential CCCD
//! enabling, the device-information read pipeline, the authentication
//! challenge and post-auth notification routing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::models::{
    CharacteristicId, ConnectionPhase, DeviceMode, HardwareType, LedStatus, QueuedAction, Session,
};
use crate::error::{AuthError, SessionError, TransportError};
use crate::infrastructure::bluetooth::led::LedMonitor;
use crate::infrastructure::bluetooth::scheduler::CommandScheduler;
use crate::infrastructure::bluetooth::transport::GattTransport;
use crate::infrastructure::bluetooth::{auth, protocol};

/// How long to wait for the dongle's ciphertext notification. A silent
/// dongle is treated exactly like a wrong answer: fatal, no retry.
pub const CHALLENGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the service layer needs once the handshake has succeeded.
pub struct EstablishedSession {
    pub transport: Arc<dyn GattTransport>,
    pub scheduler: CommandScheduler,
    pub session: Arc<Mutex<Session>>,
    pub led_rx: watch::Receiver<LedStatus>,
    pub router: JoinHandle<()>,
}

/// Run the full handshake over an already-open link.
///
/// The ordering in here is mandatory, not an optimization: both CCCD
/// writes are awaited one after the other (parallel descriptor writes
/// collide at the transport level), and no read is issued before the
/// previous one's completion.
pub async fn establish(
    transport: Arc<dyn GattTransport>,
    address: u64,
    name: String,
    phase: Arc<watch::Sender<ConnectionPhase>>,
) -> Result<EstablishedSession, SessionError> {
    let chars = transport.characteristics().await?;
    for required in [
        CharacteristicId::Keyboard,
        CharacteristicId::Mouse,
        CharacteristicId::Command,
    ] {
        if !chars.contains(&required) {
            return Err(SessionError::MissingCharacteristic(required));
        }
    }
    let has_unicode = chars.contains(&CharacteristicId::UnicodeText);
    debug!(?chars, has_unicode, "characteristics resolved");

    // Keyboard CCCD first, command CCCD only after its completion.
    let keyboard_rx = transport.subscribe(CharacteristicId::Keyboard).await?;
    let command_rx = transport.subscribe(CharacteristicId::Command).await?;

    let _ = phase.send(ConnectionPhase::Authenticating);

    // Device-information pipeline, strictly sequential.
    let system_id = read_system_id(transport.as_ref()).await?;
    let firmware_version = read_string(transport.as_ref(), CharacteristicId::FirmwareVersion).await?;
    let hardware_version = read_string(transport.as_ref(), CharacteristicId::HardwareVersion).await?;
    let software_version = read_string(transport.as_ref(), CharacteristicId::SoftwareVersion).await?;
    let pnp_id = read_pnp_id(transport.as_ref()).await;

    let mut hardware_type = auth::classify_hardware(&hardware_version);
    if has_unicode {
        // The unicode characteristic only exists on modern firmware;
        // trust its presence over the revision-string heuristic.
        hardware_type = HardwareType::ModernUnicodeCapable;
    }
    let vendor = protocol::vendor_from_pnp(pnp_id.as_ref(), &firmware_version);

    info!(
        %firmware_version,
        %hardware_version,
        %software_version,
        ?hardware_type,
        vendor = vendor.name,
        "device information read"
    );

    let mut command_rx = command_rx;
    run_challenge(
        transport.as_ref(),
        &mut command_rx,
        &system_id,
        &software_version,
    )
    .await?;
    info!("dongle authenticated");

    let session = Arc::new(Mutex::new(Session {
        address,
        name,
        system_id,
        firmware_version,
        hardware_version,
        software_version,
        pnp_id,
        hardware_type,
        vendor,
        device_mode: DeviceMode::Unknown,
    }));

    let scheduler = CommandScheduler::spawn(Arc::clone(&transport));
    scheduler.open_gate();
    let _ = phase.send(ConnectionPhase::Connected);

    // Learn the current USB identity right away.
    scheduler.enqueue(QueuedAction::write(
        CharacteristicId::Command,
        protocol::mode_query_command(&system_id),
    ));

    let (led_monitor, led_rx) = LedMonitor::new();
    let router = tokio::spawn(route_notifications(
        keyboard_rx,
        command_rx,
        led_monitor,
        Arc::clone(&session),
        scheduler.clone(),
        phase,
    ));

    Ok(EstablishedSession {
        transport,
        scheduler,
        session,
        led_rx,
        router,
    })
}

async fn read_system_id(transport: &dyn GattTransport) -> Result<[u8; 8], SessionError> {
    let bytes = transport.read(CharacteristicId::SystemId).await?;
    let id: [u8; 8] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| AuthError::MalformedDeviceInfo(CharacteristicId::SystemId, bytes.len()))?;
    Ok(id)
}

async fn read_string(
    transport: &dyn GattTransport,
    characteristic: CharacteristicId,
) -> Result<String, TransportError> {
    let bytes = transport.read(characteristic).await?;
    Ok(String::from_utf8_lossy(&bytes)
        .trim_end_matches('\0')
        .trim()
        .to_string())
}

/// PnP ID is optional: older firmware omits it, and the handshake then
/// continues with a conservative vendor default.
async fn read_pnp_id(transport: &dyn GattTransport) -> Option<[u8; 7]> {
    match transport.read(CharacteristicId::PnpId).await {
        Ok(bytes) => match bytes.as_slice().try_into() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(len = bytes.len(), "PnP ID has unexpected length, ignoring");
                None
            }
        },
        Err(error) => {
            debug!(%error, "PnP ID not readable, using vendor defaults");
            None
        }
    }
}

async fn run_challenge(
    transport: &dyn GattTransport,
    command_rx: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    system_id: &[u8; 8],
    software_version: &str,
) -> Result<(), SessionError> {
    transport
        .write(
            CharacteristicId::Command,
            &protocol::challenge_command(system_id),
        )
        .await?;

    let response = await_challenge_response(command_rx).await?;
    let proof = auth::extract_proof(&response).ok_or(AuthError::MalformedDeviceInfo(
        CharacteristicId::Command,
        response.len(),
    ))?;
    auth::verify(system_id, software_version, proof)?;
    Ok(())
}

/// Wait for a notification long enough to carry the proof. Short payloads
/// are logged and skipped (state unchanged), per the wire contract.
async fn await_challenge_response(
    command_rx: &mut mpsc::UnboundedReceiver<Vec<u8>>,
) -> Result<Vec<u8>, AuthError> {
    let wait = async {
        loop {
            match command_rx.recv().await {
                Some(payload) if payload.len() >= auth::MIN_RESPONSE_LEN => return Ok(payload),
                Some(payload) => {
                    warn!(len = payload.len(), "short ciphertext notification ignored");
                }
                None => return Err(AuthError::ChannelClosed),
            }
        }
    };
    tokio::time::timeout(CHALLENGE_TIMEOUT, wait)
        .await
        .map_err(|_| AuthError::ChallengeTimeout(CHALLENGE_TIMEOUT))?
}

/// Post-auth notification routing: keyboard-channel payloads feed the LED
/// monitor, command-channel payloads update the device mode. Either stream
/// closing means the link is gone; the queue is dropped immediately, and
/// any in-flight completion after that is discarded by the scheduler. A
/// failed write is terminal the same way, but surfaces as Error.
async fn route_notifications(
    mut keyboard_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut command_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    led_monitor: LedMonitor,
    session: Arc<Mutex<Session>>,
    scheduler: CommandScheduler,
    phase: Arc<watch::Sender<ConnectionPhase>>,
) {
    loop {
        tokio::select! {
            payload = keyboard_rx.recv() => match payload {
                Some(payload) => led_monitor.handle_notification(&payload),
                None => break,
            },
            payload = command_rx.recv() => match payload {
                Some(payload) => handle_command_notification(&payload, &session),
                None => break,
            },
            _ = scheduler.write_failure() => {
                warn!("transport write failed, tearing session down");
                scheduler.shutdown();
                let _ = phase.send(ConnectionPhase::Error);
                return;
            }
        }
    }

    info!("link lost, tearing session down");
    scheduler.shutdown();
    let _ = phase.send(ConnectionPhase::Disconnected);
}

fn handle_command_notification(payload: &[u8], session: &Arc<Mutex<Session>>) {
    match protocol::parse_mode_report(payload) {
        Some(mode) => {
            let mut session = session.lock().unwrap();
            if session.device_mode != mode {
                info!(?mode, "device mode reported");
                session.device_mode = mode;
            }
        }
        None => debug!(len = payload.len(), "unhandled command notification ignored"),
    }
}
