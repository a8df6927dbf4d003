//! EmulStick dongle protocol
//!
//! Wire-level definitions for the vendor GATT service: characteristic
//! identifiers, command opcodes, known USB identities and the vendor- and
//! version-aware mode-switch command builders.

use tracing::debug;

use crate::domain::models::{CharacteristicId, DeviceMode, ModeSwitchKind, VendorInfo};

/// Vendor service UUID16.
pub const SERVICE_UUID16: u16 = 0xF800;
/// Standard device-information service.
pub const DEVICE_INFO_UUID16: u16 = 0x180A;

impl CharacteristicId {
    /// 16-bit UUID of this characteristic.
    pub fn uuid16(self) -> u16 {
        match self {
            CharacteristicId::Keyboard => 0xF801,
            CharacteristicId::DirectText => 0xF802,
            CharacteristicId::Mouse => 0xF803,
            CharacteristicId::UnicodeText => 0xF805,
            CharacteristicId::Command => 0xF80F,
            CharacteristicId::SystemId => 0x2A23,
            CharacteristicId::FirmwareVersion => 0x2A26,
            CharacteristicId::HardwareVersion => 0x2A27,
            CharacteristicId::SoftwareVersion => 0x2A28,
            CharacteristicId::PnpId => 0x2A50,
        }
    }
}

/// Command-channel opcodes.
pub mod opcode {
    pub const GET_CIPHERTEXT: u8 = 0x91;
    pub const SET_COMMON: u8 = 0x40;
    pub const SET_EMUL_DEVICE: u8 = 0x50;
    pub const SET_COMPOSITE: u8 = 0x51;
    pub const GET_EMULATE: u8 = 0xA1;
    pub const REPORT_EMULATE: u8 = 0xA0;
}

/// USB identities the dongle can present, plus the PnP vendor IDs used to
/// pick the right mode-switch command form.
pub mod ids {
    /// Xbox-360 controller.
    pub const XBOX360_VID: u16 = 0x045E;
    pub const XBOX360_PID: u16 = 0x028E;
    /// TI-generation composite device.
    pub const TI_COMPOSITE_VID: u16 = 0x0451;
    pub const TI_COMPOSITE_PID: u16 = 0xE010;
    /// WCH-generation composite device.
    pub const WCH_COMPOSITE_VID: u16 = 0x4348;
    pub const WCH_COMPOSITE_PID: u16 = 0xE010;
    /// Single-keyboard identity (a Microsoft keyboard).
    pub const SINGLE_KEYBOARD_VID: u16 = 0x045E;
    pub const SINGLE_KEYBOARD_PID: u16 = 0x002D;

    /// Bluetooth-SIG company identifiers carried in the PnP ID.
    pub const PNP_VENDOR_TI: u16 = 0x000D;
    pub const PNP_VENDOR_WCH: u16 = 0x07D7;
}

/// `[0x91, id6, id7]`: ask the dongle to encrypt its challenge material.
pub fn challenge_command(system_id: &[u8; 8]) -> Vec<u8> {
    vec![opcode::GET_CIPHERTEXT, system_id[6], system_id[7]]
}

/// `[0xA1, id6, id7]`: query the currently emulated USB identity.
pub fn mode_query_command(system_id: &[u8; 8]) -> Vec<u8> {
    vec![opcode::GET_EMULATE, system_id[6], system_id[7]]
}

/// Switch the dongle to the Xbox-360 identity.
pub fn xinput_switch_command(system_id: &[u8; 8]) -> Vec<u8> {
    let vid = ids::XBOX360_VID.to_le_bytes();
    let pid = ids::XBOX360_PID.to_le_bytes();
    vec![
        opcode::SET_EMUL_DEVICE,
        system_id[6],
        system_id[7],
        vid[0],
        vid[1],
        pid[0],
        pid[1],
    ]
}

/// Switch the dongle back to the keyboard+mouse composite identity.
///
/// The command form depends on the vendor and, for TI dongles, on the
/// firmware generation: the earliest TI firmware only understands the
/// parameterless `SetCommon` form.
pub fn composite_switch_command(
    system_id: &[u8; 8],
    vendor_vid: u16,
    firmware_version: &str,
) -> Vec<u8> {
    match switch_kind_for(vendor_vid, firmware_version) {
        ModeSwitchKind::SetComposite => {
            vec![opcode::SET_COMPOSITE, system_id[6], system_id[7]]
        }
        ModeSwitchKind::SetCommon => {
            vec![opcode::SET_COMMON, system_id[6], system_id[7]]
        }
        ModeSwitchKind::SetEmulDevice => {
            let vid = ids::TI_COMPOSITE_VID.to_le_bytes();
            let pid = ids::TI_COMPOSITE_PID.to_le_bytes();
            vec![
                opcode::SET_EMUL_DEVICE,
                system_id[6],
                system_id[7],
                vid[0],
                vid[1],
                pid[0],
                pid[1],
            ]
        }
    }
}

/// Mode-switch command form for a PnP vendor ID + firmware string.
pub fn switch_kind_for(vendor_vid: u16, firmware_version: &str) -> ModeSwitchKind {
    match vendor_vid {
        ids::PNP_VENDOR_WCH => ModeSwitchKind::SetComposite,
        ids::PNP_VENDOR_TI => {
            match FirmwareVersion::parse(firmware_version) {
                Some(v) if v.is_generation_zero() => ModeSwitchKind::SetCommon,
                // Unparseable firmware strings get the modern form too.
                _ => ModeSwitchKind::SetEmulDevice,
            }
        }
        other => {
            debug!(vid = format_args!("{other:#06X}"), "unrecognized PnP vendor, using TI-modern switch form");
            ModeSwitchKind::SetEmulDevice
        }
    }
}

/// Vendor identity derived from the PnP ID characteristic
/// (`[vendorIdSource, vidLo, vidHi, pidLo, pidHi, verLo, verHi]`).
pub fn vendor_from_pnp(pnp_id: Option<&[u8; 7]>, firmware_version: &str) -> VendorInfo {
    let vid = pnp_id.map(|p| u16::from_le_bytes([p[1], p[2]]));
    match vid {
        Some(ids::PNP_VENDOR_WCH) => VendorInfo {
            name: "WCH",
            vid: ids::PNP_VENDOR_WCH,
            switch_kind: ModeSwitchKind::SetComposite,
        },
        Some(ids::PNP_VENDOR_TI) => VendorInfo {
            name: "Texas Instruments",
            vid: ids::PNP_VENDOR_TI,
            switch_kind: switch_kind_for(ids::PNP_VENDOR_TI, firmware_version),
        },
        Some(other) => VendorInfo {
            name: "Unknown",
            vid: other,
            switch_kind: ModeSwitchKind::SetEmulDevice,
        },
        // No PnP ID: conservative default, modern TI form.
        None => VendorInfo {
            name: "Unknown",
            vid: 0,
            switch_kind: ModeSwitchKind::SetEmulDevice,
        },
    }
}

/// Semantic firmware version parsed from the revision string ("1.2.0").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FirmwareVersion {
    /// Leading "major.minor.patch" prefix; missing components are zero.
    pub fn parse(s: &str) -> Option<Self> {
        let numeric: String = s
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let mut parts = numeric.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Some(Self {
            major,
            minor,
            patch,
        })
    }

    /// The earliest TI firmware line (1.1.x and 1.2.0) predates the
    /// parameterized mode-switch command.
    pub fn is_generation_zero(self) -> bool {
        self.major == 1 && (self.minor == 1 || (self.minor == 2 && self.patch == 0))
    }
}

/// Decode a `[0xA0|0xA1, vidLo, vidHi, pidLo, pidHi, ver]` mode report.
///
/// Short or foreign payloads yield `None`; callers log and ignore them.
pub fn parse_mode_report(payload: &[u8]) -> Option<DeviceMode> {
    if payload.len() < 6 {
        return None;
    }
    if payload[0] != opcode::REPORT_EMULATE && payload[0] != opcode::GET_EMULATE {
        return None;
    }

    let vid = u16::from_le_bytes([payload[1], payload[2]]);
    let pid = u16::from_le_bytes([payload[3], payload[4]]);
    Some(device_mode_for(vid, pid))
}

fn device_mode_for(vid: u16, pid: u16) -> DeviceMode {
    match (vid, pid) {
        (ids::XBOX360_VID, ids::XBOX360_PID) => DeviceMode::XInput,
        (ids::TI_COMPOSITE_VID, ids::TI_COMPOSITE_PID)
        | (ids::WCH_COMPOSITE_VID, ids::WCH_COMPOSITE_PID) => DeviceMode::Composite,
        (ids::SINGLE_KEYBOARD_VID, ids::SINGLE_KEYBOARD_PID) => DeviceMode::SingleKeyboard,
        _ => DeviceMode::Unknown,
    }
}
