//! Shared types for the fire-alarm bridge

use serde::{Deserialize, Deserializer, Serialize};

/// Newtype wrapper for device identifiers to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        DeviceId(s.to_string())
    }
}

/// Classification of an inbound message by originating topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Flame,
    Gas,
    CombinedState,
    Unrecognized,
}

impl ReportKind {
    pub fn as_str(&self) -> &str {
        match self {
            ReportKind::Flame => "flame",
            ReportKind::Gas => "gas",
            ReportKind::CombinedState => "state",
            ReportKind::Unrecognized => "unrecognized",
        }
    }
}

/// Sensor reading value - devices report either a raw ADC number or a
/// preformatted string depending on firmware revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reading {
    Number(f64),
    Text(String),
}

impl Default for Reading {
    fn default() -> Self {
        Reading::Number(0.0)
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reading::Number(n) => write!(f, "{}", n),
            Reading::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Wire payload for flame and gas sensor reports
///
/// `DO_State` is the binary detection flag (1 = hazard detected),
/// `AO_Value` the analog reading. The device `timestamp` is seconds
/// since boot and is recorded but never used for ordering.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorPayload {
    pub device_id: Option<DeviceId>,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(rename = "DO_State", deserialize_with = "deserialize_flag")]
    pub do_state: bool,
    #[serde(rename = "AO_Value", default)]
    pub ao_value: Reading,
}

/// Wire payload for combined actuator state reports
#[derive(Debug, Clone, Deserialize)]
pub struct StatePayload {
    pub device_id: Option<DeviceId>,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(rename = "BUZZER_State", deserialize_with = "deserialize_flag")]
    pub buzzer: bool,
    #[serde(rename = "VALVE_State", deserialize_with = "deserialize_flag")]
    pub valve: bool,
}

/// Accept a binary flag as either a JSON bool or a 0/1 integer -
/// firmware revisions disagree on the encoding
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct FlagVisitor;

    impl<'de> Visitor<'de> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a boolean or 0/1 integer flag")
        }

        fn visit_bool<E>(self, value: bool) -> Result<bool, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<bool, E>
        where
            E: de::Error,
        {
            Ok(value != 0)
        }

        fn visit_i64<E>(self, value: i64) -> Result<bool, E>
        where
            E: de::Error,
        {
            Ok(value != 0)
        }
    }

    deserializer.deserialize_any(FlagVisitor)
}

/// Sensor fields carried by a flame or gas report
#[derive(Debug, Clone, Serialize)]
pub struct SensorReading {
    pub detected: bool,
    pub reading: Reading,
}

/// Actuator fields carried by a combined-state report
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ActuatorFlags {
    pub buzzer: bool,
    pub valve: bool,
}

/// Typed report body, resolved once at normalization time.
/// Downstream code matches exhaustively on this tag.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReportBody {
    Flame(SensorReading),
    Gas(SensorReading),
    Actuators(ActuatorFlags),
}

/// One normalized inbound report, immutable once constructed
#[derive(Debug, Clone, Serialize)]
pub struct IngestedReport {
    pub device_id: DeviceId,
    pub topic: String,
    /// Server-assigned receipt time (epoch ms) - the authoritative
    /// ordering key for this device's stream
    pub received_at: u64,
    /// Device-reported timestamp (seconds since boot), informational only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_timestamp: Option<u64>,
    #[serde(flatten)]
    pub body: ReportBody,
}

impl IngestedReport {
    pub fn kind(&self) -> ReportKind {
        match self.body {
            ReportBody::Flame(_) => ReportKind::Flame,
            ReportBody::Gas(_) => ReportKind::Gas,
            ReportBody::Actuators(_) => ReportKind::CombinedState,
        }
    }
}

/// Actuator addressed by an operator command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandTarget {
    Buzzer,
    Valve,
}

impl CommandTarget {
    pub fn as_str(&self) -> &str {
        match self {
            CommandTarget::Buzzer => "buzzer",
            CommandTarget::Valve => "valve",
        }
    }
}

impl std::str::FromStr for CommandTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buzzer" => Ok(CommandTarget::Buzzer),
            "valve" => Ok(CommandTarget::Valve),
            other => Err(format!("unknown command target: {}", other)),
        }
    }
}

/// One outbound control request, transient for the duration of relay + publish
#[derive(Debug, Clone)]
pub struct Command {
    pub device_id: DeviceId,
    pub target: CommandTarget,
    pub desired_state: bool,
}

/// Current wall-clock time as epoch milliseconds
pub fn epoch_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_payload_flag_as_int() {
        let json = r#"{"device_id":"esp32_01","timestamp":120,"DO_State":1,"AO_Value":1500}"#;
        let payload: SensorPayload = serde_json::from_str(json).unwrap();
        assert!(payload.do_state);
        assert_eq!(payload.ao_value, Reading::Number(1500.0));
        assert_eq!(payload.device_id, Some(DeviceId::from("esp32_01")));
    }

    #[test]
    fn test_sensor_payload_reading_as_string() {
        let json = r#"{"device_id":"esp32_01","DO_State":0,"AO_Value":"low"}"#;
        let payload: SensorPayload = serde_json::from_str(json).unwrap();
        assert!(!payload.do_state);
        assert_eq!(payload.ao_value, Reading::Text("low".to_string()));
    }

    #[test]
    fn test_state_payload_flag_as_bool() {
        let json =
            r#"{"device_id":"esp32_01","timestamp":5,"BUZZER_State":true,"VALVE_State":false}"#;
        let payload: StatePayload = serde_json::from_str(json).unwrap();
        assert!(payload.buzzer);
        assert!(!payload.valve);
    }

    #[test]
    fn test_state_payload_flag_as_int() {
        let json = r#"{"device_id":"esp32_01","BUZZER_State":0,"VALVE_State":1}"#;
        let payload: StatePayload = serde_json::from_str(json).unwrap();
        assert!(!payload.buzzer);
        assert!(payload.valve);
    }

    #[test]
    fn test_command_target_from_str() {
        assert_eq!("buzzer".parse::<CommandTarget>().unwrap(), CommandTarget::Buzzer);
        assert_eq!("valve".parse::<CommandTarget>().unwrap(), CommandTarget::Valve);
        assert!("siren".parse::<CommandTarget>().is_err());
    }

    #[test]
    fn test_report_serializes_flat() {
        let report = IngestedReport {
            device_id: DeviceId::from("esp32_01"),
            topic: "fire_alarm/esp32_01/sensor/flame".to_string(),
            received_at: 1767617600000,
            device_timestamp: Some(42),
            body: ReportBody::Flame(SensorReading {
                detected: true,
                reading: Reading::Number(1800.0),
            }),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["device_id"], "esp32_01");
        assert_eq!(json["detected"], true);
        assert_eq!(json["reading"], 1800.0);
        assert_eq!(json["received_at"], 1767617600000u64);
    }
}
