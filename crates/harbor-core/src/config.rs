//! harbor.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credentials::Credentials;
use crate::types::NodeAddress;

/// Default per-operation timeout for remote probes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarborConfig {
    pub topology: Topology,
    #[serde(default)]
    pub probe: ProbeSettings,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
}

/// The deployed topology a diagnostic run inspects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub virtual_address: NodeAddress,
    #[serde(default)]
    pub lvs_nodes: Vec<NodeAddress>,
    #[serde(default)]
    pub async_replica: Option<NodeAddress>,
    /// Raw `user:password` string.
    #[serde(default)]
    pub credentials: String,
    #[serde(default)]
    pub galera: Vec<GaleraNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaleraNode {
    pub address: NodeAddress,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMode {
    /// One probe at a time, in topology order.
    #[default]
    Sequential,
    /// Probes within a tier run concurrently.
    Concurrent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSettings {
    #[serde(with = "duration_str", default = "default_timeout")]
    pub connect_timeout: Duration,
    #[serde(with = "duration_str", default = "default_timeout")]
    pub command_timeout: Duration,
    #[serde(default)]
    pub mode: ProbeMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_user")]
    pub user: String,
    #[serde(default = "default_identity_file")]
    pub identity_file: Option<PathBuf>,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Extra `-o Key=Value` options passed to every ssh invocation.
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default = "default_interface_listing")]
    pub interface_listing: String,
    #[serde(default = "default_routing_dump")]
    pub routing_dump: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// 1-based position of the weight among the fields after the `->` marker.
    #[serde(default = "default_weight_field")]
    pub weight_field: usize,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_ssh_user() -> String {
    "ubuntu".to_string()
}

fn default_identity_file() -> Option<PathBuf> {
    Some(PathBuf::from("/home/ubuntu/.ssh/id_ansible"))
}

fn default_ssh_port() -> u16 {
    22
}

fn default_interface_listing() -> String {
    "ip -o addr show".to_string()
}

fn default_routing_dump() -> String {
    "sudo -n ipvsadm -Ln".to_string()
}

fn default_weight_field() -> usize {
    4
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            command_timeout: DEFAULT_TIMEOUT,
            mode: ProbeMode::default(),
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            identity_file: default_identity_file(),
            port: default_ssh_port(),
            options: Vec::new(),
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            interface_listing: default_interface_listing(),
            routing_dump: default_routing_dump(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            weight_field: default_weight_field(),
        }
    }
}

impl Topology {
    pub fn credentials(&self) -> Credentials {
        Credentials::parse(&self.credentials)
    }
}

impl HarborConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.apply_env();
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// `HARBOR_CREDENTIALS` replaces the credentials from the file.
    pub fn apply_env(&mut self) {
        if let Ok(creds) = std::env::var("HARBOR_CREDENTIALS") {
            self.topology.credentials = creds;
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a three-node Galera, two-LVS topology.
    pub fn scaffold() -> Self {
        HarborConfig {
            topology: Topology {
                virtual_address: "10.0.0.100".into(),
                lvs_nodes: vec!["10.0.0.11".into(), "10.0.0.12".into()],
                async_replica: Some("10.0.0.30".into()),
                credentials: "root:change-me".to_string(),
                galera: (1..=3)
                    .map(|i| GaleraNode {
                        address: format!("10.0.0.2{i}").into(),
                        name: Some(format!("galera-{i}")),
                    })
                    .collect(),
            },
            probe: ProbeSettings::default(),
            ssh: SshConfig::default(),
            commands: CommandsConfig::default(),
            routing: RoutingConfig::default(),
        }
    }
}

/// Path of the config file: `HARBOR_CONFIG` or `/etc/harbor/harbor.toml`.
pub fn default_config_path() -> PathBuf {
    match std::env::var("HARBOR_CONFIG") {
        Ok(path) => PathBuf::from(path),
        Err(_) => PathBuf::from("/etc/harbor/harbor.toml"),
    }
}

/// Parse a duration string like "5s", "500ms", "1m", or plain seconds.
/// Zero and out-of-range values are rejected.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::InvalidDuration(s.to_string());
    let (value, unit_ms) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1_000)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60_000)
    } else {
        (s, 1_000)
    };
    let millis = value
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|v| v.checked_mul(unit_ms))
        .filter(|&ms| ms > 0)
        .ok_or_else(invalid)?;
    Ok(Duration::from_millis(millis))
}

fn format_duration(d: Duration) -> String {
    if d.subsec_millis() != 0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}s", d.as_secs())
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[topology]
virtual_address = "10.0.0.100"
"#;

    #[test]
    fn test_parse_minimal_uses_defaults() {
        let config = HarborConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.topology.virtual_address.as_str(), "10.0.0.100");
        assert!(config.topology.galera.is_empty());
        assert!(config.topology.async_replica.is_none());
        assert_eq!(config.probe.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.probe.mode, ProbeMode::Sequential);
        assert_eq!(config.ssh.user, "ubuntu");
        assert_eq!(config.ssh.port, 22);
        assert_eq!(config.commands.routing_dump, "sudo -n ipvsadm -Ln");
        assert_eq!(config.routing.weight_field, 4);
    }

    #[test]
    fn test_parse_full_topology() {
        let toml_str = r#"
[topology]
virtual_address = "10.0.0.100"
lvs_nodes = ["10.0.0.11", "10.0.0.12"]
async_replica = "10.0.0.30"
credentials = "sst:pa:ss"

[[topology.galera]]
address = "10.0.0.21"
name = "galera-1"

[[topology.galera]]
address = "10.0.0.22"

[probe]
connect_timeout = "2s"
command_timeout = "750ms"
mode = "concurrent"

[ssh]
user = "ops"
port = 2222
options = ["StrictHostKeyChecking=no"]
"#;
        let config = HarborConfig::parse(toml_str).unwrap();
        assert_eq!(config.topology.galera.len(), 2);
        assert_eq!(config.topology.galera[0].name.as_deref(), Some("galera-1"));
        assert_eq!(config.topology.galera[1].name, None);
        assert_eq!(config.topology.lvs_nodes.len(), 2);
        assert_eq!(config.probe.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.probe.command_timeout, Duration::from_millis(750));
        assert_eq!(config.probe.mode, ProbeMode::Concurrent);
        assert_eq!(config.ssh.port, 2222);

        let creds = config.topology.credentials();
        assert_eq!(creds.user, "sst");
        assert_eq!(creds.password, "pa:ss");
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        let toml_str = r#"
[topology]
virtual_address = "10.0.0.100"

[probe]
connect_timeout = "soon"
"#;
        let err = HarborConfig::parse(toml_str).unwrap_err();
        assert!(err.to_string().contains("soon"));
    }

    #[test]
    fn test_scaffold_roundtrips() {
        let config = HarborConfig::scaffold();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("galera-1"));
        let parsed = HarborConfig::parse(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harbor.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = HarborConfig::from_file(&path).unwrap();
        assert_eq!(config.topology.virtual_address.as_str(), "10.0.0.100");
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = HarborConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn parse_duration_forms() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert!(parse_duration("fast").is_err());
    }

    #[test]
    fn parse_duration_rejects_zero_and_overflow() {
        assert!(matches!(parse_duration("0s"), Err(ConfigError::InvalidDuration(_))));
        assert!(matches!(parse_duration("0"), Err(ConfigError::InvalidDuration(_))));
        assert!(matches!(
            parse_duration("18446744073709551615m"),
            Err(ConfigError::InvalidDuration(_))
        ));
        assert!(parse_duration("18446744073709551615s").is_err());
    }

    #[test]
    fn format_duration_prefers_seconds() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_millis(750)), "750ms");
    }
}
