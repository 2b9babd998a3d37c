//! Domain models - core business types for the fire-alarm bridge
//!
//! This module contains the canonical data types used throughout the system:
//! - `IngestedReport` - one normalized inbound sensor report
//! - `DeviceState` - the authoritative merged snapshot per device
//! - `Command` - an outbound actuator control request
//! - `AlarmStatus` / `classify` - the derived hazard classification

pub mod state;
pub mod types;
