use crate::domain::models::TextInputMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "emulstick".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Case-insensitive substring used to filter scan results.
    #[serde(default = "default_name_filter")]
    pub device_name_filter: String,
    /// Discovery window in milliseconds.
    #[serde(default = "default_scan_window_ms")]
    pub scan_window_ms: u64,
    /// Strategy for non-ASCII text on legacy dongles.
    #[serde(default)]
    pub text_input_mode: TextInputMode,

    pub known_bluetooth_addresses: Vec<u64>,
    pub last_connected_address: Option<u64>,

    #[serde(default)]
    pub log_settings: LogSettings,

    #[serde(default = "default_false")]
    pub debug_show_all_devices: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_name_filter: default_name_filter(),
            scan_window_ms: default_scan_window_ms(),
            text_input_mode: TextInputMode::default(),
            known_bluetooth_addresses: Vec::new(),
            last_connected_address: None,
            log_settings: LogSettings::default(),
            debug_show_all_devices: false,
        }
    }
}

fn default_name_filter() -> String {
    "emulstick".to_string()
}
fn default_scan_window_ms() -> u64 {
    4000
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();

        Ok(Self {
            settings,
            settings_path,
        })
    }

    /// Use an explicit settings file instead of the platform config dir.
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("EmulStick");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &PathBuf) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn add_known_address(&mut self, address: u64) -> anyhow::Result<()> {
        if !self.settings.known_bluetooth_addresses.contains(&address) {
            self.settings.known_bluetooth_addresses.push(address);
            self.save()?;
        }
        Ok(())
    }

    pub fn set_last_connected(&mut self, address: u64) -> anyhow::Result<()> {
        self.settings.last_connected_address = Some(address);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.device_name_filter, "emulstick");
        assert_eq!(back.scan_window_ms, 4000);
        assert_eq!(back.text_input_mode, TextInputMode::AltXUnicode);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{"known_bluetooth_addresses":[],"last_connected_address":null}"#,
        )
        .unwrap();
        assert_eq!(settings.scan_window_ms, 4000);
        assert!(!settings.debug_show_all_devices);
    }
}
