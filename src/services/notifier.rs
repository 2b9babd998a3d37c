//! Alarm notifier - pushes hazard transitions to a Telegram chat
//!
//! Consumes the same `DeviceUpdate` stream as any other observer (one
//! hub session) and tracks the last seen `AlarmStatus` per device. A
//! notification fires only when a device's status changes: escalations
//! carry the hazard, a drop back to Normal carries the all-clear.
//! Repeated reports at the same level stay silent, so a device
//! publishing every few seconds cannot flood the chat.
//!
//! Delivery is best-effort over the Telegram Bot API; a failed send is
//! logged and dropped, never retried, and the device table is the
//! source of truth either way.

use crate::domain::state::{AlarmStatus, DeviceState, DeviceUpdate};
use crate::domain::types::DeviceId;
use rustc_hash::FxHashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Decide whether a status change warrants a push.
///
/// Any transition notifies, including recovery to Normal; staying at
/// the same level never does.
pub fn should_notify(previous: AlarmStatus, current: AlarmStatus) -> bool {
    previous != current
}

/// Render the notification text for one post-transition state (HTML,
/// Telegram parse_mode)
pub fn format_alert(state: &DeviceState) -> String {
    let (header, advice) = match state.alarm {
        AlarmStatus::Alarm => ("EMERGENCY ALARM", "Fire and gas detected. Evacuate immediately."),
        AlarmStatus::Warning => ("GAS WARNING", "Gas leak detected. Ventilate the area."),
        AlarmStatus::Normal => ("ALL CLEAR", "No hazards detected."),
    };

    format!(
        "<b>{header}</b>\n\
         Device: {device}\n\
         {advice}\n\
         Flame: {flame} ({flame_value})\n\
         Gas: {gas} ({gas_value})\n\
         Buzzer: {buzzer:?} / Valve: {valve:?}",
        header = header,
        device = state.id,
        advice = advice,
        flame = if state.flame_detected { "DETECTED" } else { "normal" },
        flame_value = state.flame_reading,
        gas = if state.gas_detected { "DETECTED" } else { "normal" },
        gas_value = state.gas_reading,
        buzzer = state.buzzer,
        valve = state.valve,
    )
}

/// Telegram push channel for alarm transitions
pub struct AlarmNotifier {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
    last_status: FxHashMap<DeviceId, AlarmStatus>,
    #[cfg(test)]
    mock_enabled: bool,
    #[cfg(test)]
    sent: Vec<String>,
}

impl AlarmNotifier {
    pub fn new(bot_token: &str, chat_id: &str) -> Self {
        // One client for connection reuse across pushes
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
            last_status: FxHashMap::default(),
            #[cfg(test)]
            mock_enabled: true,
            #[cfg(test)]
            sent: Vec::new(),
        }
    }

    /// Consume hub updates until the stream ends or shutdown is signaled
    pub async fn run(
        mut self,
        mut update_rx: mpsc::Receiver<DeviceUpdate>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(chat_id = %self.chat_id, "notifier_started");
        loop {
            tokio::select! {
                update = update_rx.recv() => {
                    match update {
                        Some(update) => self.handle_update(&update).await,
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("notifier_shutdown");
                        break;
                    }
                }
            }
        }
    }

    /// Track the device's status and push on a transition
    pub async fn handle_update(&mut self, update: &DeviceUpdate) {
        let current = update.state.alarm;
        let previous = self
            .last_status
            .insert(update.state.id.clone(), current)
            .unwrap_or(AlarmStatus::Normal);

        if !should_notify(previous, current) {
            return;
        }

        info!(
            device_id = %update.state.id,
            from = %previous.as_str(),
            to = %current.as_str(),
            "alarm_transition"
        );
        self.push(format_alert(&update.state)).await;
    }

    async fn push(&mut self, text: String) {
        #[cfg(test)]
        if self.mock_enabled {
            self.sent.push(text);
            return;
        }

        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API_BASE, self.bot_token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("notification_sent");
            }
            Ok(response) => {
                warn!(status = %response.status(), "notification_rejected");
            }
            Err(e) => {
                warn!(error = %e, "notification_send_failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::{BuzzerStatus, ValveStatus};
    use crate::domain::types::Reading;

    fn update_with_alarm(device: &str, flame: bool, gas: bool, at: u64) -> DeviceUpdate {
        let mut state = DeviceState::new(DeviceId::from(device));
        state.flame_detected = flame;
        state.gas_detected = gas;
        state.alarm = crate::domain::state::classify(flame, gas);
        state.updated_at = at;
        DeviceUpdate {
            topic: format!("fire_alarm/{}/sensor/gas", device),
            kind: "gas",
            received_at: at,
            state,
        }
    }

    #[test]
    fn test_should_notify_on_transitions_only() {
        assert!(should_notify(AlarmStatus::Normal, AlarmStatus::Warning));
        assert!(should_notify(AlarmStatus::Warning, AlarmStatus::Alarm));
        assert!(should_notify(AlarmStatus::Alarm, AlarmStatus::Normal));
        assert!(!should_notify(AlarmStatus::Normal, AlarmStatus::Normal));
        assert!(!should_notify(AlarmStatus::Alarm, AlarmStatus::Alarm));
    }

    #[test]
    fn test_format_alert_carries_device_and_hazard() {
        let mut state = DeviceState::new(DeviceId::from("FA-101"));
        state.flame_detected = true;
        state.gas_detected = true;
        state.alarm = AlarmStatus::Alarm;
        state.flame_reading = Reading::Number(1500.0);
        state.gas_reading = Reading::Number(2800.0);
        state.buzzer = BuzzerStatus::Active;
        state.valve = ValveStatus::Open;

        let text = format_alert(&state);
        assert!(text.contains("EMERGENCY ALARM"));
        assert!(text.contains("FA-101"));
        assert!(text.contains("1500"));
        assert!(text.contains("2800"));
    }

    #[tokio::test]
    async fn test_repeated_status_stays_silent() {
        let mut notifier = AlarmNotifier::new("token", "42");

        // First Warning notifies, the repeat does not
        notifier.handle_update(&update_with_alarm("FA-101", false, true, 100)).await;
        notifier.handle_update(&update_with_alarm("FA-101", false, true, 200)).await;
        assert_eq!(notifier.sent.len(), 1);
        assert!(notifier.sent[0].contains("GAS WARNING"));
    }

    #[tokio::test]
    async fn test_escalation_and_recovery_both_notify() {
        let mut notifier = AlarmNotifier::new("token", "42");

        notifier.handle_update(&update_with_alarm("FA-101", false, true, 100)).await;
        notifier.handle_update(&update_with_alarm("FA-101", true, true, 200)).await;
        notifier.handle_update(&update_with_alarm("FA-101", false, false, 300)).await;

        assert_eq!(notifier.sent.len(), 3);
        assert!(notifier.sent[1].contains("EMERGENCY ALARM"));
        assert!(notifier.sent[2].contains("ALL CLEAR"));
    }

    #[tokio::test]
    async fn test_initial_normal_report_stays_silent() {
        // A device coming up clean is not a transition worth pushing
        let mut notifier = AlarmNotifier::new("token", "42");
        notifier.handle_update(&update_with_alarm("FA-101", false, false, 100)).await;
        assert!(notifier.sent.is_empty());
    }

    #[tokio::test]
    async fn test_devices_tracked_independently() {
        let mut notifier = AlarmNotifier::new("token", "42");

        notifier.handle_update(&update_with_alarm("FA-101", false, true, 100)).await;
        // A second device at Normal must not suppress or trigger anything
        notifier.handle_update(&update_with_alarm("FA-102", false, false, 200)).await;
        notifier.handle_update(&update_with_alarm("FA-102", false, true, 300)).await;

        assert_eq!(notifier.sent.len(), 2);
    }
}
