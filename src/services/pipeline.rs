//! Ingestion pipeline - persist, reconcile, broadcast
//!
//! Single consumer of the normalized report channel. Each report is
//! appended to the store and merged into the device table, and the
//! post-merge state is fanned out to observers. Persistence and
//! broadcast are independent best-effort steps: a failed store write
//! is logged and never blocks the broadcast, and vice versa.
//!
//! Because this task is the only writer of the device table, reports
//! for the same device apply in receipt order with no interleaved
//! field writes.

use crate::domain::state::DeviceUpdate;
use crate::domain::types::IngestedReport;
use crate::infra::metrics::Metrics;
use crate::io::store::ReportStore;
use crate::services::hub::Hub;
use crate::services::reconciler::{ApplyError, SharedDeviceTable};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Central report processor
pub struct Pipeline {
    table: SharedDeviceTable,
    store: ReportStore,
    hub: Arc<Hub>,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    pub fn new(
        table: SharedDeviceTable,
        store: ReportStore,
        hub: Arc<Hub>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { table, store, hub, metrics }
    }

    /// Consume reports until the channel closes or shutdown is signaled
    pub async fn run(
        &self,
        mut report_rx: mpsc::Receiver<IngestedReport>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                report = report_rx.recv() => {
                    match report {
                        Some(report) => self.process_report(report),
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("pipeline_shutdown");
                        break;
                    }
                }
            }
        }
    }

    /// Run one report through persist -> reconcile -> broadcast.
    ///
    /// Every failure is contained to this report: the pipeline keeps
    /// going and no other device's state is affected.
    pub fn process_report(&self, report: IngestedReport) {
        match self.store.append(&report) {
            Ok(()) => self.metrics.record_persisted(),
            Err(e) => {
                self.metrics.record_persist_failure();
                error!(
                    device_id = %report.device_id,
                    kind = %report.kind().as_str(),
                    error = %e,
                    "store_append_failed"
                );
            }
        }

        let merged = self.table.write().apply(&report);
        match merged {
            Ok(state) => {
                let update = DeviceUpdate::new(&report, state);
                let delivered = self.hub.publish(&update);
                self.metrics.record_broadcast(delivered as u64);
            }
            Err(ApplyError::UnknownDevice(id)) => {
                self.metrics.record_unknown_device();
                warn!(device_id = %id, topic = %report.topic, "report_for_unknown_device");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::AlarmStatus;
    use crate::domain::types::{
        DeviceId, Reading, ReportBody, ReportKind, SensorReading,
    };
    use crate::infra::config::Config;
    use crate::services::reconciler::DeviceTable;
    use std::fs;
    use tempfile::tempdir;

    fn sensor_report(device: &str, kind: ReportKind, detected: bool, at: u64) -> IngestedReport {
        let reading = SensorReading { detected, reading: Reading::Number(2000.0) };
        let body = match kind {
            ReportKind::Flame => ReportBody::Flame(reading),
            ReportKind::Gas => ReportBody::Gas(reading),
            other => panic!("not a sensor kind: {:?}", other),
        };
        IngestedReport {
            device_id: DeviceId::from(device),
            topic: format!("fire_alarm/{}/sensor/{}", device, kind.as_str()),
            received_at: at,
            device_timestamp: None,
            body,
        }
    }

    fn test_pipeline(dir: &std::path::Path, devices: &[&str]) -> (Pipeline, Arc<Hub>) {
        let config =
            Config::default().with_devices(devices.iter().map(|s| s.to_string()).collect());
        let table = DeviceTable::shared(&config);
        let hub = Arc::new(Hub::new());
        let pipeline = Pipeline::new(
            table,
            ReportStore::new(dir),
            hub.clone(),
            Arc::new(Metrics::new()),
        );
        (pipeline, hub)
    }

    #[tokio::test]
    async fn test_report_is_persisted_and_broadcast() {
        let dir = tempdir().unwrap();
        let (pipeline, hub) = test_pipeline(dir.path(), &["FA-101"]);
        let (_id, mut rx) = hub.join();

        pipeline.process_report(sensor_report("FA-101", ReportKind::Gas, true, 100));

        let update = rx.recv().await.unwrap();
        assert_eq!(update.kind, "gas");
        assert_eq!(update.state.alarm, AlarmStatus::Warning);

        let stored = fs::read_to_string(dir.path().join("gas.jsonl")).unwrap();
        assert_eq!(stored.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_escalation_reaches_observers_in_order() {
        // Flame alone is Normal; the following gas report escalates to
        // Alarm, and both updates arrive in receipt order
        let dir = tempdir().unwrap();
        let (pipeline, hub) = test_pipeline(dir.path(), &["FA-101"]);
        let (_id, mut rx) = hub.join();

        pipeline.process_report(sensor_report("FA-101", ReportKind::Flame, true, 100));
        pipeline.process_report(sensor_report("FA-101", ReportKind::Gas, true, 200));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.state.alarm, AlarmStatus::Normal);
        assert!(first.state.flame_detected);
        assert!(!first.state.gas_detected);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.state.alarm, AlarmStatus::Alarm);
        assert!(second.state.flame_detected);
        assert!(second.state.gas_detected);

        // Persisted under the per-kind collections
        assert!(dir.path().join("flame.jsonl").exists());
        assert!(dir.path().join("gas.jsonl").exists());
    }

    #[tokio::test]
    async fn test_unknown_device_not_broadcast() {
        let dir = tempdir().unwrap();
        let (pipeline, hub) = test_pipeline(dir.path(), &["FA-101"]);
        let (_id, mut rx) = hub.join();

        pipeline.process_report(sensor_report("FA-999", ReportKind::Flame, true, 100));

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_store_failure_does_not_block_broadcast() {
        let dir = tempdir().unwrap();
        // A file where the store expects a directory makes appends fail
        let bad_dir = dir.path().join("blocked");
        fs::write(&bad_dir, b"").unwrap();

        let config = Config::default().with_devices(vec!["FA-101".to_string()]);
        let table = DeviceTable::shared(&config);
        let hub = Arc::new(Hub::new());
        let metrics = Arc::new(Metrics::new());
        let pipeline =
            Pipeline::new(table, ReportStore::new(&bad_dir), hub.clone(), metrics.clone());
        let (_id, mut rx) = hub.join();

        pipeline.process_report(sensor_report("FA-101", ReportKind::Flame, true, 100));

        // Broadcast still went out
        let update = rx.recv().await.unwrap();
        assert!(update.state.flame_detected);
        assert_eq!(metrics.persist_failure_count(), 1);
    }
}
