use sg_domain::config::{Config, ConfigSeverity, ScanMode};

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 3710);
}

#[test]
fn default_config_validates_clean() {
    let config = Config::default();
    assert!(config.validate().is_empty());
}

#[test]
fn empty_toml_parses_to_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.store.state_path.to_string_lossy(), "./data/sentinelgate/state.json");
    assert_eq!(config.scanning.mode, ScanMode::Monitor);
    assert!(!config.scanning.enabled);
}

#[test]
fn explicit_sections_override_defaults() {
    let toml_str = r#"
[server]
host = "127.0.0.1"
port = 9000

[scanning]
enabled = true
mode = "enforce"

[server.rate_limit]
max_requests = 10
window_secs = 5
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.port, 9000);
    assert!(config.scanning.enabled);
    assert_eq!(config.scanning.mode, ScanMode::Enforce);
    let rl = config.server.rate_limit.unwrap();
    assert_eq!(rl.max_requests, 10);
}

#[test]
fn zero_port_is_an_error() {
    let toml_str = "[server]\nport = 0\n";
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field == "server.port"));
}

#[test]
fn non_loopback_host_warns() {
    let toml_str = "[server]\nhost = \"0.0.0.0\"\n";
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Warning && i.field == "server.host"));
}

#[test]
fn invalid_scan_pattern_is_an_error() {
    let toml_str = "[scanning]\nrequest_patterns = [\"[unclosed\"]\n";
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field == "scanning.request_patterns"));
}
