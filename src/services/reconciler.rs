//! Device state reconciliation
//!
//! The `DeviceTable` owns the authoritative state for every tracked
//! device. The pipeline task is the table's only writer, so updates to
//! a single device are linearized in receipt order; HTTP snapshot
//! reads share the lock read-side.
//!
//! The registry is closed by default: reports for unlisted devices are
//! rejected. `auto_register` opts into lazy creation on first report.

use crate::domain::state::DeviceState;
use crate::domain::types::{DeviceId, IngestedReport};
use crate::infra::config::Config;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::info;

/// Why a report was rejected by the reconciler
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),
}

/// Authoritative per-device state, keyed by device id
pub struct DeviceTable {
    devices: FxHashMap<DeviceId, DeviceState>,
    auto_register: bool,
}

/// Shared handle: pipeline writes, HTTP handlers read
pub type SharedDeviceTable = Arc<RwLock<DeviceTable>>;

impl DeviceTable {
    /// Seed the table from the configured device registry
    pub fn new(config: &Config) -> Self {
        let mut devices = FxHashMap::default();
        for id in config.devices() {
            let id = DeviceId(id.clone());
            devices.insert(id.clone(), DeviceState::new(id));
        }
        info!(
            devices = %devices.len(),
            auto_register = %config.auto_register(),
            "device_table_seeded"
        );
        Self { devices, auto_register: config.auto_register() }
    }

    pub fn shared(config: &Config) -> SharedDeviceTable {
        Arc::new(RwLock::new(Self::new(config)))
    }

    /// Merge a report into its device's state and return the post-merge
    /// snapshot. Unknown devices are rejected unless lazy registration
    /// is enabled.
    pub fn apply(&mut self, report: &IngestedReport) -> Result<DeviceState, ApplyError> {
        if !self.devices.contains_key(&report.device_id) {
            if !self.auto_register {
                return Err(ApplyError::UnknownDevice(report.device_id.clone()));
            }
            info!(device_id = %report.device_id, "device_registered");
            self.devices
                .insert(report.device_id.clone(), DeviceState::new(report.device_id.clone()));
        }

        // contains_key/insert above guarantee presence
        let state = self
            .devices
            .get_mut(&report.device_id)
            .expect("device present after registration check");
        state.merge(report);
        Ok(state.clone())
    }

    pub fn get(&self, id: &DeviceId) -> Option<&DeviceState> {
        self.devices.get(id)
    }

    /// Point-in-time snapshot of every tracked device
    pub fn snapshot(&self) -> Vec<DeviceState> {
        let mut states: Vec<DeviceState> = self.devices.values().cloned().collect();
        states.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        states
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
