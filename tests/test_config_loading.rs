//! Settings-file loading and validation
//!
//! Tests focus on observable outcomes: what ends up in the validated config,
//! and which invalid inputs are refused.

use mqtt_facade::config::{
    ClientSettings, ConfigError, ConnectionConfig, CredentialMatching, ServerSettings,
};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_client_settings_load_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
server_address = "broker.local"
port = 8883
username = "gateway"
password = "s3cret"
client_id = "gateway-7"
reconnect_interval_secs = 2.5
keep_alive_secs = 30
"#
    )
    .unwrap();

    let config = ClientSettings::load_from_file(temp_file.path())
        .unwrap()
        .into_config()
        .unwrap();

    assert_eq!(config.server_address(), "broker.local");
    assert_eq!(config.port(), 8883);
    assert_eq!(config.username(), Some("gateway"));
    assert_eq!(config.password(), Some("s3cret"));
    assert_eq!(config.client_id(), "gateway-7");
    assert_eq!(config.reconnect_interval(), Duration::from_millis(2500));
    assert_eq!(config.keep_alive(), Duration::from_secs(30));
}

#[test]
fn test_client_settings_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "# everything defaulted").unwrap();

    let config = ClientSettings::load_from_file(temp_file.path())
        .unwrap()
        .into_config()
        .unwrap();

    assert_eq!(config.server_address(), "127.0.0.1");
    assert_eq!(config.port(), 1883);
    assert_eq!(config.reconnect_interval(), Duration::from_secs(5));
    assert!(config.username().is_none());
}

#[test]
fn test_client_settings_credentials_from_environment() {
    std::env::set_var("MQTT_FACADE_TEST_USER", "env-user");
    std::env::set_var("MQTT_FACADE_TEST_PASS", "env-pass");

    let settings = ClientSettings::from_toml_str(
        r#"
server_address = "localhost"
username_env = "MQTT_FACADE_TEST_USER"
password_env = "MQTT_FACADE_TEST_PASS"
"#,
    )
    .unwrap();
    let config = settings.into_config().unwrap();

    assert_eq!(config.username(), Some("env-user"));
    assert_eq!(config.password(), Some("env-pass"));
    assert!(!format!("{config:?}").contains("env-pass"));
}

#[test]
fn test_client_settings_invalid_values_rejected() {
    let cases = [
        ("server_address = \"   \"", "blank address"),
        ("port = 0", "zero port"),
        ("port = -1", "negative port"),
        ("port = 70000", "port out of range"),
        ("reconnect_interval_secs = -1.0", "negative interval"),
    ];

    for (toml, label) in cases {
        let result = ClientSettings::from_toml_str(toml).unwrap().into_config();
        assert!(result.is_err(), "{label} should be rejected");
    }
}

#[test]
fn test_missing_file_reports_read_error() {
    let result = ClientSettings::load_from_file(std::path::Path::new("/nonexistent/client.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_reports_parse_error() {
    let result = ClientSettings::from_toml_str("port = [not toml");
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_server_settings_with_admission() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
bind_address = "0.0.0.0"
port = 1883

[admission]
client_ids = ["dev-1", "dev-2"]
usernames = ["alice", "bob"]
passwords = ["a-pass", "b-pass"]
port = 1884
credential_matching = "positional"
"#
    )
    .unwrap();

    let config = ServerSettings::load_from_file(temp_file.path())
        .unwrap()
        .into_config()
        .unwrap();

    let admission = config.admission().unwrap();
    assert_eq!(admission.client_ids, vec!["dev-1", "dev-2"]);
    assert_eq!(admission.port, 1884);
    assert_eq!(admission.credential_matching, CredentialMatching::Positional);
    assert_eq!(config.port(), 1883);
}

#[test]
fn test_constructed_config_validates_eagerly() {
    assert!(ConnectionConfig::new("", 1883).is_err());
    assert!(ConnectionConfig::new("  ", 1883).is_err());
    assert!(ConnectionConfig::new("localhost", 0).is_err());
    assert!(ConnectionConfig::new("localhost", 1).is_ok());

    let config = ConnectionConfig::new("localhost", 1883).unwrap();
    assert!(config.clone().with_port(0).is_err());
    assert!(config.with_server_address("").is_err());
}
