//! Configuration loading from TOML files
//!
//! Config file is selected via the --config command line argument
//! (default: config/dev.toml). A missing or unparsable file falls back
//! to built-in defaults with a warning.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Run the embedded MQTT broker in-process
    #[serde(default = "default_broker_enabled")]
    pub enabled: bool,
    #[serde(default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
}

fn default_broker_enabled() -> bool {
    true
}

fn default_broker_bind_address() -> String {
    "0.0.0.0".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: default_broker_enabled(),
            bind_address: default_broker_bind_address(),
            port: default_mqtt_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicsConfig {
    /// Topic namespace shared by devices and the bridge
    #[serde(default = "default_topic_prefix")]
    pub prefix: String,
}

fn default_topic_prefix() -> String {
    "fire_alarm".to_string()
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self { prefix: default_topic_prefix() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Device ids the bridge tracks
    #[serde(default = "default_devices")]
    pub devices: Vec<String>,
    /// Accept reports from unlisted devices by creating state lazily
    #[serde(default)]
    pub auto_register: bool,
}

fn default_devices() -> Vec<String> {
    vec!["esp32_01".to_string()]
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { devices: default_devices(), auto_register: false }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Directory for the per-kind JSONL report logs
    #[serde(default = "default_store_dir")]
    pub dir: String,
}

fn default_store_dir() -> String {
    "data".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { dir: default_store_dir() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Bind address for the dashboard API and WebSocket endpoint
    #[serde(default = "default_http_bind")]
    pub bind: String,
}

fn default_http_bind() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind: default_http_bind() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotifierConfig {
    /// Push alarm-transition notifications to a Telegram chat
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    30
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub topics: TopicsConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    broker_enabled: bool,
    broker_bind_address: String,
    broker_port: u16,
    topic_prefix: String,
    devices: Vec<String>,
    auto_register: bool,
    store_dir: String,
    http_bind: String,
    notifier_enabled: bool,
    notifier_bot_token: Option<String>,
    notifier_chat_id: Option<String>,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            broker_enabled: toml_config.broker.enabled,
            broker_bind_address: toml_config.broker.bind_address,
            broker_port: toml_config.broker.port,
            topic_prefix: toml_config.topics.prefix,
            devices: toml_config.registry.devices,
            auto_register: toml_config.registry.auto_register,
            store_dir: toml_config.store.dir,
            http_bind: toml_config.http.bind,
            notifier_enabled: toml_config.notifier.enabled,
            notifier_bot_token: toml_config.notifier.bot_token,
            notifier_chat_id: toml_config.notifier.chat_id,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: config_file.to_string(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn broker_enabled(&self) -> bool {
        self.broker_enabled
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    pub fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }

    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    pub fn auto_register(&self) -> bool {
        self.auto_register
    }

    pub fn store_dir(&self) -> &str {
        &self.store_dir
    }

    pub fn http_bind(&self) -> &str {
        &self.http_bind
    }

    pub fn notifier_enabled(&self) -> bool {
        self.notifier_enabled
    }

    pub fn notifier_bot_token(&self) -> Option<&str> {
        self.notifier_bot_token.as_deref()
    }

    pub fn notifier_chat_id(&self) -> Option<&str> {
        self.notifier_chat_id.as_deref()
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the tracked device list
    #[cfg(test)]
    pub fn with_devices(mut self, devices: Vec<String>) -> Self {
        self.devices = devices;
        self
    }

    /// Builder method for tests to enable lazy device registration
    #[cfg(test)]
    pub fn with_auto_register(mut self, auto_register: bool) -> Self {
        self.auto_register = auto_register;
        self
    }
}
