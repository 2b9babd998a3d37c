//! Services - business logic and state management
//!
//! This module contains the core services:
//! - `reconciler` - Authoritative per-device state table and merge logic
//! - `hub` - Broadcast fan-out to observer sessions
//! - `pipeline` - Persist/reconcile/broadcast report processor
//! - `notifier` - Telegram push on alarm transitions

pub mod hub;
pub mod notifier;
pub mod pipeline;
pub mod reconciler;

// Re-export commonly used types
pub use hub::Hub;
pub use notifier::AlarmNotifier;
pub use pipeline::Pipeline;
pub use reconciler::DeviceTable;
