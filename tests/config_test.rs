//! Integration tests for configuration loading

use firebridge::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[mqtt]
host = "test-host"
port = 1884
username = "bridge"
password = "secret"

[broker]
enabled = false

[topics]
prefix = "plant_a"

[registry]
devices = ["esp32_01", "esp32_02"]
auto_register = true

[store]
dir = "/var/lib/firebridge"

[http]
bind = "127.0.0.1:8080"

[notifier]
enabled = true
bot_token = "123456:token"
chat_id = "987654321"

[metrics]
interval_secs = 15
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.mqtt_host(), "test-host");
    assert_eq!(config.mqtt_port(), 1884);
    assert_eq!(config.mqtt_username(), Some("bridge"));
    assert!(!config.broker_enabled());
    assert_eq!(config.topic_prefix(), "plant_a");
    assert_eq!(config.devices(), &["esp32_01".to_string(), "esp32_02".to_string()]);
    assert!(config.auto_register());
    assert_eq!(config.store_dir(), "/var/lib/firebridge");
    assert_eq!(config.http_bind(), "127.0.0.1:8080");
    assert!(config.notifier_enabled());
    assert_eq!(config.notifier_bot_token(), Some("123456:token"));
    assert_eq!(config.notifier_chat_id(), Some("987654321"));
    assert_eq!(config.metrics_interval_secs(), 15);
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.mqtt_host(), "localhost");
    assert_eq!(config.mqtt_port(), 1883);
    assert_eq!(config.topic_prefix(), "fire_alarm");
}
