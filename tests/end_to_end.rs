//! End-to-end tests over a scripted mock transport: the full
//! scan → connect → authenticate → operate flow, asserting the exact
//! bytes and ordering the dongle would see on the air.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use emulstick_core::domain::models::CharacteristicId;
use emulstick_core::domain::settings::SettingsService;
use emulstick_core::infrastructure::bluetooth::auth;
use emulstick_core::{
    BleCentral, ConnectionPhase, DeviceMode, EmulStickService, GattTransport, HardwareType,
    ScannedDevice, TransportError,
};

const SYSTEM_ID: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0xA7, 0xB8];
const WCH_PNP: [u8; 7] = [0x01, 0xD7, 0x07, 0x10, 0xE0, 0x00, 0x01];

struct MockDongle {
    characteristics: Vec<CharacteristicId>,
    device_info: HashMap<CharacteristicId, Vec<u8>>,
    /// USB identity reported on mode queries, mutated by switch commands.
    emulated: Mutex<(u16, u16)>,
    writes: Mutex<Vec<(CharacteristicId, Vec<u8>)>>,
    command_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    keyboard_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    tamper_proof: bool,
    /// When set, input-report writes start failing at the GATT level.
    fail_input_writes: AtomicBool,
    disconnected: AtomicBool,
}

impl MockDongle {
    fn modern_wch() -> Self {
        let mut device_info = HashMap::new();
        device_info.insert(CharacteristicId::SystemId, SYSTEM_ID.to_vec());
        device_info.insert(CharacteristicId::FirmwareVersion, b"1.3.0".to_vec());
        device_info.insert(CharacteristicId::HardwareVersion, b"ESP32-S3".to_vec());
        device_info.insert(CharacteristicId::SoftwareVersion, b"2.0.1".to_vec());
        device_info.insert(CharacteristicId::PnpId, WCH_PNP.to_vec());
        Self {
            characteristics: vec![
                CharacteristicId::Keyboard,
                CharacteristicId::Mouse,
                CharacteristicId::Command,
                CharacteristicId::DirectText,
                CharacteristicId::UnicodeText,
            ],
            device_info,
            emulated: Mutex::new((0x045E, 0x028E)),
            writes: Mutex::new(Vec::new()),
            command_tx: Mutex::new(None),
            keyboard_tx: Mutex::new(None),
            tamper_proof: false,
            fail_input_writes: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
        }
    }

    fn legacy_ti() -> Self {
        let mut dongle = Self::modern_wch();
        dongle.characteristics = vec![
            CharacteristicId::Keyboard,
            CharacteristicId::Mouse,
            CharacteristicId::Command,
        ];
        dongle
            .device_info
            .insert(CharacteristicId::HardwareVersion, b"TI CC2650".to_vec());
        dongle
            .device_info
            .insert(CharacteristicId::FirmwareVersion, b"1.1.0".to_vec());
        dongle.device_info.insert(
            CharacteristicId::PnpId,
            vec![0x01, 0x0D, 0x00, 0x10, 0xE0, 0x00, 0x01],
        );
        dongle
            .device_info
            .insert(CharacteristicId::SoftwareVersion, b"1.0.4".to_vec());
        *dongle.emulated.lock().unwrap() = (0x0451, 0xE010);
        dongle
    }

    fn writes_to(&self, characteristic: CharacteristicId) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == characteristic)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn notify_command(&self, payload: Vec<u8>) {
        if let Some(tx) = self.command_tx.lock().unwrap().as_ref() {
            let _ = tx.send(payload);
        }
    }

    fn notify_keyboard(&self, payload: Vec<u8>) {
        if let Some(tx) = self.keyboard_tx.lock().unwrap().as_ref() {
            let _ = tx.send(payload);
        }
    }

    fn answer_command(&self, payload: &[u8]) {
        match payload.first() {
            Some(0x91) => {
                let software = self.device_info[&CharacteristicId::SoftwareVersion].clone();
                let software = String::from_utf8(software).unwrap();
                let plaintext = auth::plaintext_for(&software).unwrap();
                let mut proof = auth::expected_proof(&SYSTEM_ID, plaintext).to_vec();
                if self.tamper_proof {
                    proof[0] ^= 0xFF;
                }
                let mut response = vec![0x91];
                response.extend_from_slice(&proof);
                self.notify_command(response);
            }
            Some(0xA1) if payload.len() == 3 => {
                let (vid, pid) = *self.emulated.lock().unwrap();
                let v = vid.to_le_bytes();
                let p = pid.to_le_bytes();
                self.notify_command(vec![0xA0, v[0], v[1], p[0], p[1], 1]);
            }
            Some(0x50) if payload.len() == 7 => {
                *self.emulated.lock().unwrap() = (
                    u16::from_le_bytes([payload[3], payload[4]]),
                    u16::from_le_bytes([payload[5], payload[6]]),
                );
            }
            Some(0x51) => {
                *self.emulated.lock().unwrap() = (0x4348, 0xE010);
            }
            Some(0x40) => {
                *self.emulated.lock().unwrap() = (0x0451, 0xE010);
            }
            _ => {}
        }
    }
}

#[async_trait]
impl GattTransport for MockDongle {
    async fn characteristics(&self) -> Result<Vec<CharacteristicId>, TransportError> {
        Ok(self.characteristics.clone())
    }

    async fn write(
        &self,
        characteristic: CharacteristicId,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        if characteristic != CharacteristicId::Command
            && self.fail_input_writes.load(Ordering::SeqCst)
        {
            return Err(TransportError::Write(characteristic, "link error".into()));
        }
        self.writes
            .lock()
            .unwrap()
            .push((characteristic, payload.to_vec()));
        if characteristic == CharacteristicId::Command {
            self.answer_command(payload);
        }
        Ok(())
    }

    async fn read(&self, characteristic: CharacteristicId) -> Result<Vec<u8>, TransportError> {
        self.device_info
            .get(&characteristic)
            .cloned()
            .ok_or_else(|| TransportError::Read(characteristic, "no such value".into()))
    }

    async fn subscribe(
        &self,
        characteristic: CharacteristicId,
    ) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        match characteristic {
            CharacteristicId::Keyboard => *self.keyboard_tx.lock().unwrap() = Some(tx),
            CharacteristicId::Command => *self.command_tx.lock().unwrap() = Some(tx),
            other => return Err(TransportError::Subscribe(other, "not notifiable".into())),
        }
        Ok(rx)
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
        *self.command_tx.lock().unwrap() = None;
        *self.keyboard_tx.lock().unwrap() = None;
    }
}

struct MockCentral {
    advertising: Vec<ScannedDevice>,
    bonded: Vec<ScannedDevice>,
    dongle: Arc<MockDongle>,
}

#[async_trait]
impl BleCentral for MockCentral {
    async fn scan(&self, _window: Duration) -> Result<Vec<ScannedDevice>, TransportError> {
        Ok(self.advertising.clone())
    }

    async fn bonded_devices(&self) -> Result<Vec<ScannedDevice>, TransportError> {
        Ok(self.bonded.clone())
    }

    async fn connect(&self, _address: u64) -> Result<Arc<dyn GattTransport>, TransportError> {
        Ok(Arc::clone(&self.dongle) as Arc<dyn GattTransport>)
    }
}

fn dongle_device() -> ScannedDevice {
    ScannedDevice {
        name: "EmulStick KM".to_string(),
        address: 0xA1B2C3D4E5F6,
        signal_strength: -55,
        bonded: false,
    }
}

fn service_for(dongle: Arc<MockDongle>) -> EmulStickService {
    let central = Arc::new(MockCentral {
        advertising: vec![dongle_device()],
        bonded: vec![],
        dongle,
    });
    let settings_path = std::env::temp_dir().join(format!(
        "emulstick-test-{}-{:?}.json",
        std::process::id(),
        std::thread::current().id()
    ));
    let settings = Arc::new(Mutex::new(SettingsService::with_path(settings_path)));
    EmulStickService::new(central, settings)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test(start_paused = true)]
async fn connects_authenticates_and_learns_device_mode() {
    let dongle = Arc::new(MockDongle::modern_wch());
    let mut service = service_for(Arc::clone(&dongle));
    let phase = service.connection_phase();

    service.connect(&dongle_device()).await.unwrap();
    assert_eq!(*phase.borrow(), ConnectionPhase::Connected);
    assert_eq!(
        service.hardware_type(),
        Some(HardwareType::ModernUnicodeCapable)
    );

    // The challenge went out before anything else on the command channel,
    // and the mode query followed automatically after auth.
    let commands = dongle.writes_to(CharacteristicId::Command);
    assert_eq!(commands[0], vec![0x91, 0xA7, 0xB8]);
    wait_until(|| dongle.writes_to(CharacteristicId::Command).len() >= 2).await;
    assert_eq!(dongle.writes_to(CharacteristicId::Command)[1], vec![0xA1, 0xA7, 0xB8]);

    wait_until(|| service.device_mode() == Some(DeviceMode::XInput)).await;
}

#[tokio::test(start_paused = true)]
async fn tampered_ciphertext_is_fatal_and_never_retried() {
    let mut mock = MockDongle::modern_wch();
    mock.tamper_proof = true;
    let dongle = Arc::new(mock);
    let mut service = service_for(Arc::clone(&dongle));
    let phase = service.connection_phase();

    assert!(service.connect(&dongle_device()).await.is_err());
    assert_eq!(*phase.borrow(), ConnectionPhase::Error);
    assert!(dongle.disconnected.load(Ordering::SeqCst));

    // Exactly one challenge: no silent retry.
    let challenges = dongle
        .writes_to(CharacteristicId::Command)
        .iter()
        .filter(|c| c[0] == 0x91)
        .count();
    assert_eq!(challenges, 1);
}

#[tokio::test(start_paused = true)]
async fn missing_required_characteristic_is_fatal() {
    let mut mock = MockDongle::modern_wch();
    mock.characteristics = vec![CharacteristicId::Keyboard, CharacteristicId::Command];
    let dongle = Arc::new(mock);
    let mut service = service_for(Arc::clone(&dongle));
    let phase = service.connection_phase();

    let error = service.connect(&dongle_device()).await.unwrap_err();
    assert!(error.to_string().contains("Mouse"));
    assert_eq!(*phase.borrow(), ConnectionPhase::Error);
    assert!(dongle.disconnected.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn typing_ascii_produces_pulsed_keyboard_reports() {
    let dongle = Arc::new(MockDongle::modern_wch());
    let mut service = service_for(Arc::clone(&dongle));
    service.connect(&dongle_device()).await.unwrap();

    service.type_text("Hi").unwrap();
    wait_until(|| dongle.writes_to(CharacteristicId::Keyboard).len() >= 4).await;

    let reports = dongle.writes_to(CharacteristicId::Keyboard);
    assert_eq!(reports[0], vec![0x02, 0, 0x0B, 0, 0, 0, 0, 0]); // Shift+H
    assert_eq!(reports[1], vec![0u8; 8]);
    assert_eq!(reports[2], vec![0x00, 0, 0x0C, 0, 0, 0, 0, 0]); // i
    assert_eq!(reports[3], vec![0u8; 8]);
}

#[tokio::test(start_paused = true)]
async fn modern_dongle_types_cjk_over_the_unicode_characteristic() {
    let dongle = Arc::new(MockDongle::modern_wch());
    let mut service = service_for(Arc::clone(&dongle));
    service.connect(&dongle_device()).await.unwrap();

    service.type_text("中").unwrap();
    wait_until(|| !dongle.writes_to(CharacteristicId::UnicodeText).is_empty()).await;

    let writes = dongle.writes_to(CharacteristicId::UnicodeText);
    assert_eq!(writes[0], 0x4E2Du32.to_le_bytes().to_vec());
}

#[tokio::test(start_paused = true)]
async fn oversized_pointer_move_is_split() {
    let dongle = Arc::new(MockDongle::modern_wch());
    let mut service = service_for(Arc::clone(&dongle));
    service.connect(&dongle_device()).await.unwrap();

    service.move_pointer(5000, 0).unwrap();
    wait_until(|| dongle.writes_to(CharacteristicId::Mouse).len() >= 3).await;

    let reports = dongle.writes_to(CharacteristicId::Mouse);
    assert_eq!(reports.len(), 3);
    let sum: i32 = reports
        .iter()
        .map(|r| i16::from_le_bytes([r[1], r[2]]) as i32)
        .sum();
    assert!((5000 - sum).abs() < 3);
}

#[tokio::test(start_paused = true)]
async fn wch_composite_switch_uses_the_short_form_and_requeries() {
    let dongle = Arc::new(MockDongle::modern_wch());
    let mut service = service_for(Arc::clone(&dongle));
    service.connect(&dongle_device()).await.unwrap();
    wait_until(|| service.device_mode() == Some(DeviceMode::XInput)).await;

    service.switch_to_composite().unwrap();
    wait_until(|| service.device_mode() == Some(DeviceMode::Composite)).await;

    let commands = dongle.writes_to(CharacteristicId::Command);
    assert!(commands.contains(&vec![0x51, 0xA7, 0xB8]));
    // Switch confirmed by a fresh query after the command.
    let switch_pos = commands.iter().position(|c| c[0] == 0x51).unwrap();
    assert!(commands[switch_pos + 1..].iter().any(|c| c[0] == 0xA1));
}

#[tokio::test(start_paused = true)]
async fn legacy_ti_switches_back_with_set_common() {
    let dongle = Arc::new(MockDongle::legacy_ti());
    let mut service = service_for(Arc::clone(&dongle));
    service.connect(&dongle_device()).await.unwrap();
    assert_eq!(service.hardware_type(), Some(HardwareType::LegacyTi));

    service.switch_to_xinput().unwrap();
    wait_until(|| service.device_mode() == Some(DeviceMode::XInput)).await;
    let commands = dongle.writes_to(CharacteristicId::Command);
    assert!(commands.contains(&vec![0x50, 0xA7, 0xB8, 0x5E, 0x04, 0x8E, 0x02]));

    // Generation-zero TI firmware only understands the parameterless form.
    service.switch_to_composite().unwrap();
    wait_until(|| service.device_mode() == Some(DeviceMode::Composite)).await;
    let commands = dongle.writes_to(CharacteristicId::Command);
    assert!(commands.contains(&vec![0x40, 0xA7, 0xB8]));
}

#[tokio::test(start_paused = true)]
async fn led_notifications_reach_the_caller_debounced() {
    let dongle = Arc::new(MockDongle::modern_wch());
    let mut service = service_for(Arc::clone(&dongle));
    service.connect(&dongle_device()).await.unwrap();

    let led_rx = service.led_status().unwrap();
    dongle.notify_keyboard(vec![0b001]);
    wait_until(|| led_rx.borrow().num_lock).await;

    let mut led_rx = led_rx;
    led_rx.mark_unchanged();
    dongle.notify_keyboard(vec![0b001]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!led_rx.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn failed_write_surfaces_error_and_stops_input() {
    let dongle = Arc::new(MockDongle::modern_wch());
    let mut service = service_for(Arc::clone(&dongle));
    let phase = service.connection_phase();
    service.connect(&dongle_device()).await.unwrap();
    wait_until(|| service.device_mode() == Some(DeviceMode::XInput)).await;

    dongle.fail_input_writes.store(true, Ordering::SeqCst);
    service.move_pointer(10, 0).unwrap();
    wait_until(|| *phase.borrow() == ConnectionPhase::Error).await;

    // The session is dead: later input never reaches the transport.
    let keyboard_before = dongle.writes_to(CharacteristicId::Keyboard).len();
    dongle.fail_input_writes.store(false, Ordering::SeqCst);
    service.press_key(0, 0x04).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        dongle.writes_to(CharacteristicId::Keyboard).len(),
        keyboard_before
    );
}

#[tokio::test(start_paused = true)]
async fn link_loss_drops_the_session() {
    let dongle = Arc::new(MockDongle::modern_wch());
    let mut service = service_for(Arc::clone(&dongle));
    let phase = service.connection_phase();
    service.connect(&dongle_device()).await.unwrap();

    // Closing the notification channels is how the transport reports loss.
    dongle.disconnect().await;
    wait_until(|| *phase.borrow() == ConnectionPhase::Disconnected).await;
}

#[tokio::test]
async fn scan_merges_bonded_dongles() {
    let dongle = Arc::new(MockDongle::modern_wch());
    let central = Arc::new(MockCentral {
        advertising: vec![dongle_device()],
        bonded: vec![ScannedDevice {
            name: "EmulStick Old".to_string(),
            address: 0x42,
            signal_strength: 0,
            bonded: true,
        }],
        dongle,
    });
    let settings_path = std::env::temp_dir().join(format!(
        "emulstick-scan-test-{}.json",
        std::process::id()
    ));
    let settings = Arc::new(Mutex::new(SettingsService::with_path(settings_path)));
    let service = EmulStickService::new(central, settings);

    let found = service.scan().await.unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().any(|d| d.bonded));
}
