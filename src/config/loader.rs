// Configuration loader
// Loads settings from ~/.meshdisc/config.toml; a missing file means defaults.

use anyhow::{Context, Result};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::settings::{Config, StaticNetwork, Timings};

/// Load configuration from the default location.
pub fn load_config() -> Result<Config> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    load_config_from(&home.join(".meshdisc").join("config.toml"))
}

/// Load configuration from `path`. Missing keys (or a missing file) fall back
/// to the protocol defaults.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    #[derive(serde::Deserialize)]
    #[serde(deny_unknown_fields)]
    struct TomlConfig {
        #[serde(default)]
        discovery_port: Option<u16>,
        #[serde(default)]
        status_socket: Option<PathBuf>,
        #[serde(default)]
        timings: TomlTimings,
        #[serde(default)]
        network: Option<TomlNetwork>,
    }

    #[derive(Default, serde::Deserialize)]
    #[serde(deny_unknown_fields)]
    struct TomlTimings {
        fetch_timeout_ms: Option<u64>,
        probe_timeout_ms: Option<u64>,
        probe_interval_ms: Option<u64>,
        retry_backoff_ms: Option<u64>,
    }

    #[derive(serde::Deserialize)]
    #[serde(deny_unknown_fields)]
    struct TomlNetwork {
        local_address: Ipv4Addr,
        #[serde(default)]
        peers: Vec<Ipv4Addr>,
    }

    let toml_config: TomlConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let mut config = Config::default();
    if let Some(port) = toml_config.discovery_port {
        config.discovery_port = port;
    }
    if let Some(socket) = toml_config.status_socket {
        config.status_socket = socket;
    }

    let defaults = Timings::default();
    let ms = |v: Option<u64>, fallback: Duration| v.map(Duration::from_millis).unwrap_or(fallback);
    config.timings = Timings {
        fetch_timeout: ms(toml_config.timings.fetch_timeout_ms, defaults.fetch_timeout),
        probe_timeout: ms(toml_config.timings.probe_timeout_ms, defaults.probe_timeout),
        probe_interval: ms(toml_config.timings.probe_interval_ms, defaults.probe_interval),
        retry_backoff: ms(toml_config.timings.retry_backoff_ms, defaults.retry_backoff),
    };

    config.network = toml_config.network.map(|n| StaticNetwork {
        local_address: n.local_address,
        peers: n.peers,
    });

    config
        .validate()
        .context("Configuration validation failed")?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.discovery_port, 28004);
        assert!(config.network.is_none());
    }

    #[test]
    fn test_partial_file_overrides() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            r#"
discovery_port = 39000

[timings]
probe_interval_ms = 250

[network]
local_address = "100.64.0.1"
peers = ["100.64.0.2", "100.64.0.3"]
"#,
        );
        let config = load_config_from(&path).unwrap();
        assert_eq!(config.discovery_port, 39000);
        assert_eq!(config.timings.probe_interval, Duration::from_millis(250));
        assert_eq!(config.timings.fetch_timeout, Duration::from_secs(2));
        let net = config.network.unwrap();
        assert_eq!(net.local_address, Ipv4Addr::new(100, 64, 0, 1));
        assert_eq!(net.peers.len(), 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "[timings]\nretry_backoff_ms = 0\n");
        assert!(load_config_from(&path).is_err());

        let path = write(&dir, "discovery_port = \"high\"\n");
        assert!(load_config_from(&path).is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "discovery_prot = 1\n");
        assert!(load_config_from(&path).is_err());
    }
}
