//! Per-device state and the alarm classification rule
//!
//! A `DeviceState` is the authoritative merged snapshot for one device.
//! Inbound reports are partial: flame and gas reports each touch only
//! their own sensor pair, combined-state reports touch only the
//! actuator flags. `alarm` is always recomputed from the merged
//! detection flags and is never set directly by a message.

use crate::domain::types::{
    ActuatorFlags, DeviceId, IngestedReport, Reading, ReportBody, ReportKind, SensorReading,
};
use serde::Serialize;

/// Derived hazard classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlarmStatus {
    Normal,
    Warning,
    Alarm,
}

impl AlarmStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AlarmStatus::Normal => "Normal",
            AlarmStatus::Warning => "Warning",
            AlarmStatus::Alarm => "Alarm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BuzzerStatus {
    Active,
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValveStatus {
    Open,
    Closed,
}

/// Classify the hazard level from the two binary detection flags.
///
/// Both detected => Alarm. Gas alone => Warning. Anything else,
/// including flame alone, => Normal.
pub fn classify(flame_detected: bool, gas_detected: bool) -> AlarmStatus {
    match (flame_detected, gas_detected) {
        (true, true) => AlarmStatus::Alarm,
        (false, true) => AlarmStatus::Warning,
        _ => AlarmStatus::Normal,
    }
}

/// Authoritative merged state for one device
#[derive(Debug, Clone, Serialize)]
pub struct DeviceState {
    pub id: DeviceId,
    pub flame_reading: Reading,
    pub flame_detected: bool,
    pub gas_reading: Reading,
    pub gas_detected: bool,
    pub alarm: AlarmStatus,
    pub buzzer: BuzzerStatus,
    pub valve: ValveStatus,
    /// Receipt time of the last applied report (epoch ms)
    pub updated_at: u64,
}

impl DeviceState {
    pub fn new(id: DeviceId) -> Self {
        Self {
            id,
            flame_reading: Reading::default(),
            flame_detected: false,
            gas_reading: Reading::default(),
            gas_detected: false,
            alarm: AlarmStatus::Normal,
            buzzer: BuzzerStatus::Silent,
            valve: ValveStatus::Closed,
            updated_at: 0,
        }
    }

    /// Merge a normalized report into this state.
    ///
    /// Each report kind overwrites only its own fields; `alarm` is
    /// recomputed whenever a detection flag may have changed.
    pub fn merge(&mut self, report: &IngestedReport) {
        match &report.body {
            ReportBody::Flame(reading) => self.merge_flame(reading),
            ReportBody::Gas(reading) => self.merge_gas(reading),
            ReportBody::Actuators(flags) => self.merge_actuators(flags),
        }
        self.updated_at = report.received_at;
    }

    fn merge_flame(&mut self, reading: &SensorReading) {
        self.flame_reading = reading.reading.clone();
        self.flame_detected = reading.detected;
        self.alarm = classify(self.flame_detected, self.gas_detected);
    }

    fn merge_gas(&mut self, reading: &SensorReading) {
        self.gas_reading = reading.reading.clone();
        self.gas_detected = reading.detected;
        self.alarm = classify(self.flame_detected, self.gas_detected);
    }

    fn merge_actuators(&mut self, flags: &ActuatorFlags) {
        self.buzzer = if flags.buzzer { BuzzerStatus::Active } else { BuzzerStatus::Silent };
        self.valve = if flags.valve { ValveStatus::Open } else { ValveStatus::Closed };
    }
}

/// Server-to-observer frame: the post-merge state plus what triggered it
#[derive(Debug, Clone, Serialize)]
pub struct DeviceUpdate {
    pub topic: String,
    pub kind: &'static str,
    pub received_at: u64,
    pub state: DeviceState,
}

impl DeviceUpdate {
    pub fn new(report: &IngestedReport, state: DeviceState) -> Self {
        let kind = match report.kind() {
            ReportKind::Flame => "flame",
            ReportKind::Gas => "gas",
            ReportKind::CombinedState => "state",
            ReportKind::Unrecognized => "unrecognized",
        };
        Self { topic: report.topic.clone(), kind, received_at: report.received_at, state }
    }
}
