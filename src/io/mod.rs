//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `mqtt` - MQTT client for receiving device sensor reports
//! - `relay` - MQTT publisher for actuator commands
//! - `store` - Append-only report persistence (JSONL per report kind)
//! - `http` - Dashboard API and WebSocket observer endpoint

pub mod http;
pub mod mqtt;
pub mod relay;
pub mod store;

// Re-export commonly used types
pub use relay::{CommandRelay, RelayError};
pub use store::ReportStore;
