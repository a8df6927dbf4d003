//! Main dongle service.
//!
//! Coordinates scanning, session establishment and the public input
//! operations. Everything that reaches the air goes through the command
//! scheduler of the active session; callers never touch the transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::models::{
    CharacteristicId, ConnectionPhase, DeviceMode, HardwareType, LedStatus, MouseButton,
    QueuedAction, ScannedDevice, Session,
};
use crate::domain::reports::{
    build_mouse_report, split_mouse_move, GamepadReport, KeyboardReport, MOUSE_WHEEL_MAX,
};
use crate::domain::settings::SettingsService;
use crate::infrastructure::bluetooth::scanner::DongleScanner;
use crate::infrastructure::bluetooth::scheduler::CommandScheduler;
use crate::infrastructure::bluetooth::session::{establish, EstablishedSession};
use crate::infrastructure::bluetooth::transport::{BleCentral, GattTransport};
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::text_input::{TextInputEngine, KEY_PULSE_DELAY_MS};

struct ActiveConnection {
    transport: Arc<dyn GattTransport>,
    scheduler: CommandScheduler,
    session: Arc<Mutex<Session>>,
    led_rx: watch::Receiver<LedStatus>,
    router: JoinHandle<()>,
    /// Mouse buttons currently held, so drags keep them across moves.
    held_buttons: Mutex<u8>,
}

/// Public API of the dongle control engine.
pub struct EmulStickService {
    central: Arc<dyn BleCentral>,
    settings: Arc<Mutex<SettingsService>>,
    phase: Arc<watch::Sender<ConnectionPhase>>,
    active: Option<ActiveConnection>,
}

impl EmulStickService {
    pub fn new(central: Arc<dyn BleCentral>, settings: Arc<Mutex<SettingsService>>) -> Self {
        let (phase, _) = watch::channel(ConnectionPhase::Disconnected);
        Self {
            central,
            settings,
            phase: Arc::new(phase),
            active: None,
        }
    }

    /// One time-boxed discovery pass (advertising + bonded dongles).
    pub async fn scan(&self) -> Result<Vec<ScannedDevice>> {
        let (filter, window_ms, show_all) = {
            let settings = self.settings.lock().map_err(|_| anyhow!("Lock error"))?;
            let s = settings.get();
            (
                s.device_name_filter.clone(),
                s.scan_window_ms,
                s.debug_show_all_devices,
            )
        };

        let _ = self.phase.send(ConnectionPhase::Scanning);
        let scanner = DongleScanner::new(
            Arc::clone(&self.central),
            &filter,
            Duration::from_millis(window_ms),
        )
        .show_all_devices(show_all);
        let result = scanner.scan().await;

        if self.active.is_none() {
            let _ = self.phase.send(ConnectionPhase::Disconnected);
        }
        result
    }

    /// Connect and authenticate. Any failure past link-open tears the
    /// link down and surfaces a terminal Error phase; reconnect policy
    /// belongs to the caller.
    pub async fn connect(&mut self, device: &ScannedDevice) -> Result<()> {
        self.disconnect().await;

        info!(address = format_args!("{:#X}", device.address), name = %device.name, "connecting");
        let _ = self.phase.send(ConnectionPhase::Connecting);

        let transport = match self.central.connect(device.address).await {
            Ok(transport) => transport,
            Err(error) => {
                let _ = self.phase.send(ConnectionPhase::Error);
                return Err(error.into());
            }
        };

        let established = match establish(
            Arc::clone(&transport),
            device.address,
            device.name.clone(),
            Arc::clone(&self.phase),
        )
        .await
        {
            Ok(established) => established,
            Err(error) => {
                warn!(%error, "session establishment failed");
                transport.disconnect().await;
                let _ = self.phase.send(ConnectionPhase::Error);
                return Err(error.into());
            }
        };

        let EstablishedSession {
            transport,
            scheduler,
            session,
            led_rx,
            router,
        } = established;

        self.active = Some(ActiveConnection {
            transport,
            scheduler,
            session,
            led_rx,
            router,
            held_buttons: Mutex::new(0),
        });

        if let Ok(mut settings) = self.settings.lock() {
            let _ = settings.add_known_address(device.address);
            let _ = settings.set_last_connected(device.address);
        }
        Ok(())
    }

    /// Immediate, unconditional teardown: the queue is dropped without
    /// awaiting in-flight completions.
    pub async fn disconnect(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        active.scheduler.shutdown();
        active.router.abort();
        active.transport.disconnect().await;
        info!("disconnected");
        let _ = self.phase.send(ConnectionPhase::Disconnected);
    }

    // --- streams & queries -------------------------------------------

    pub fn connection_phase(&self) -> watch::Receiver<ConnectionPhase> {
        self.phase.subscribe()
    }

    pub fn led_status(&self) -> Option<watch::Receiver<LedStatus>> {
        self.active.as_ref().map(|a| a.led_rx.clone())
    }

    pub fn hardware_type(&self) -> Option<HardwareType> {
        self.with_session(|s| s.hardware_type)
    }

    pub fn device_mode(&self) -> Option<DeviceMode> {
        self.with_session(|s| s.device_mode)
    }

    // --- pointer ------------------------------------------------------

    pub fn move_pointer(&self, dx: i32, dy: i32) -> Result<()> {
        let active = self.active()?;
        let buttons = *active.held_buttons.lock().unwrap();
        active.scheduler.enqueue_all(
            split_mouse_move(dx, dy, buttons)
                .into_iter()
                .map(|r| QueuedAction::write(CharacteristicId::Mouse, r.to_vec())),
        );
        Ok(())
    }

    pub fn click(&self, button: MouseButton) -> Result<()> {
        let active = self.active()?;
        active.scheduler.enqueue_all([
            QueuedAction::write(
                CharacteristicId::Mouse,
                build_mouse_report(button.mask(), 0, 0, 0).to_vec(),
            ),
            QueuedAction::delay(KEY_PULSE_DELAY_MS),
            QueuedAction::write(
                CharacteristicId::Mouse,
                build_mouse_report(0, 0, 0, 0).to_vec(),
            ),
        ]);
        Ok(())
    }

    /// Hold buttons down (drag); subsequent moves carry them until
    /// [`Self::release_buttons`].
    pub fn press_buttons(&self, buttons: u8) -> Result<()> {
        let active = self.active()?;
        *active.held_buttons.lock().unwrap() = buttons;
        active.scheduler.enqueue(QueuedAction::write(
            CharacteristicId::Mouse,
            build_mouse_report(buttons, 0, 0, 0).to_vec(),
        ));
        Ok(())
    }

    pub fn release_buttons(&self) -> Result<()> {
        let active = self.active()?;
        *active.held_buttons.lock().unwrap() = 0;
        active.scheduler.enqueue(QueuedAction::write(
            CharacteristicId::Mouse,
            build_mouse_report(0, 0, 0, 0).to_vec(),
        ));
        Ok(())
    }

    /// Scroll by `delta` notches, split into wheel-limit chunks.
    pub fn scroll(&self, delta: i32) -> Result<()> {
        let active = self.active()?;
        let buttons = *active.held_buttons.lock().unwrap();
        let mut remaining = delta;
        let mut actions = Vec::new();
        while remaining != 0 {
            let chunk = remaining.clamp(-MOUSE_WHEEL_MAX, MOUSE_WHEEL_MAX);
            actions.push(QueuedAction::write(
                CharacteristicId::Mouse,
                build_mouse_report(buttons, 0, 0, chunk).to_vec(),
            ));
            remaining -= chunk;
        }
        active.scheduler.enqueue_all(actions);
        Ok(())
    }

    // --- keyboard -----------------------------------------------------

    /// Press and release one key ("pulse" transmission model).
    pub fn press_key(&self, modifiers: u8, keycode: u8) -> Result<()> {
        let active = self.active()?;
        active.scheduler.enqueue_all([
            QueuedAction::write(
                CharacteristicId::Keyboard,
                KeyboardReport::key(modifiers, keycode).encode().to_vec(),
            ),
            QueuedAction::delay(KEY_PULSE_DELAY_MS),
            QueuedAction::write(
                CharacteristicId::Keyboard,
                KeyboardReport::EMPTY.encode().to_vec(),
            ),
        ]);
        Ok(())
    }

    /// Hold a key; the empty report is deferred until [`Self::release_keys`].
    pub fn hold_key(&self, modifiers: u8, keycode: u8) -> Result<()> {
        let active = self.active()?;
        active.scheduler.enqueue(QueuedAction::write(
            CharacteristicId::Keyboard,
            KeyboardReport::key(modifiers, keycode).encode().to_vec(),
        ));
        Ok(())
    }

    pub fn release_keys(&self) -> Result<()> {
        let active = self.active()?;
        active.scheduler.enqueue(QueuedAction::write(
            CharacteristicId::Keyboard,
            KeyboardReport::EMPTY.encode().to_vec(),
        ));
        Ok(())
    }

    /// Type a whole string through the per-character strategy engine.
    pub fn type_text(&self, text: &str) -> Result<()> {
        let active = self.active()?;
        let hardware = active.session.lock().unwrap().hardware_type;
        let mode = {
            let settings = self.settings.lock().map_err(|_| anyhow!("Lock error"))?;
            settings.get().text_input_mode
        };
        let leds = *active.led_rx.borrow();

        let engine = TextInputEngine::new(hardware, mode);
        active.scheduler.enqueue_all(engine.encode_str(text, leds));
        Ok(())
    }

    // --- gamepad ------------------------------------------------------

    /// Transmit the full 20-byte gamepad state. The caller owns the
    /// report value and retransmits after every mutation.
    pub fn send_gamepad(&self, report: &GamepadReport) -> Result<()> {
        let active = self.active()?;
        active.scheduler.enqueue(QueuedAction::write(
            CharacteristicId::Keyboard,
            report.as_bytes().to_vec(),
        ));
        Ok(())
    }

    // --- device mode --------------------------------------------------

    pub fn switch_to_xinput(&self) -> Result<()> {
        let active = self.active()?;
        let system_id = active.session.lock().unwrap().system_id;
        self.enqueue_mode_switch(active, protocol::xinput_switch_command(&system_id), system_id);
        Ok(())
    }

    pub fn switch_to_composite(&self) -> Result<()> {
        let active = self.active()?;
        let (system_id, vid, firmware) = {
            let session = active.session.lock().unwrap();
            (
                session.system_id,
                session.vendor.vid,
                session.firmware_version.clone(),
            )
        };
        let command = protocol::composite_switch_command(&system_id, vid, &firmware);
        self.enqueue_mode_switch(active, command, system_id);
        Ok(())
    }

    pub fn query_device_mode(&self) -> Result<()> {
        let active = self.active()?;
        let system_id = active.session.lock().unwrap().system_id;
        active.scheduler.enqueue(QueuedAction::write(
            CharacteristicId::Command,
            protocol::mode_query_command(&system_id),
        ));
        Ok(())
    }

    fn enqueue_mode_switch(&self, active: &ActiveConnection, command: Vec<u8>, system_id: [u8; 8]) {
        // Re-query after the switch so the reported mode confirms it.
        active.scheduler.enqueue_all([
            QueuedAction::write(CharacteristicId::Command, command),
            QueuedAction::delay(50),
            QueuedAction::write(
                CharacteristicId::Command,
                protocol::mode_query_command(&system_id),
            ),
        ]);
    }

    // --- helpers ------------------------------------------------------

    fn active(&self) -> Result<&ActiveConnection> {
        self.active
            .as_ref()
            .ok_or_else(|| anyhow!("not connected to a dongle"))
    }

    fn with_session<T>(&self, f: impl FnOnce(&Session) -> T) -> Option<T> {
        self.active
            .as_ref()
            .map(|a| f(&a.session.lock().unwrap()))
    }
}
