//! Dongle discovery.
//!
//! Runs a time-boxed advertisement scan through the injected central,
//! filters by a case-insensitive name substring, and merges in bonded
//! dongles of the same family. Those stop advertising once paired, so
//! they would otherwise never show up again.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};

use crate::domain::models::ScannedDevice;
use crate::infrastructure::bluetooth::transport::BleCentral;

pub struct DongleScanner {
    central: Arc<dyn BleCentral>,
    name_filter: String,
    window: Duration,
    show_all: bool,
}

impl DongleScanner {
    pub fn new(central: Arc<dyn BleCentral>, name_filter: &str, window: Duration) -> Self {
        Self {
            central,
            name_filter: name_filter.to_lowercase(),
            window,
            show_all: false,
        }
    }

    /// Debug aid: skip the name filter entirely.
    pub fn show_all_devices(mut self, show_all: bool) -> Self {
        self.show_all = show_all;
        self
    }

    /// One discovery pass: scan window + bonded merge, deduplicated by
    /// address (an advertising result wins over the bond-list entry).
    pub async fn scan(&self) -> Result<Vec<ScannedDevice>> {
        info!(window = ?self.window, filter = %self.name_filter, "scanning for dongles");

        let mut found = Vec::new();
        for device in self.central.scan(self.window).await? {
            if self.matches(&device.name) {
                found.push(device);
            }
        }

        for bonded in self.central.bonded_devices().await? {
            if !self.matches(&bonded.name) {
                continue;
            }
            if found.iter().any(|d| d.address == bonded.address) {
                continue;
            }
            debug!(name = %bonded.name, "merging bonded device not seen on air");
            found.push(bonded);
        }

        info!(count = found.len(), "scan finished");
        Ok(found)
    }

    fn matches(&self, name: &str) -> bool {
        self.show_all || name.to_lowercase().contains(&self.name_filter)
    }
}
