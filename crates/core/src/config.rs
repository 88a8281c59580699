use crate::{
    error::{CoreError, Result},
    model::AgentKind,
    store::RetryPolicy,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, fmt, fs, path::PathBuf, time::Duration};

/// Where diagnostic commands run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    #[default]
    Local,
    Remote,
}

/// Remote host and credentials, ignored in local mode
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub host: String,
    pub username: String,
    /// Password for the ssh login. Key or agent authentication is used when absent.
    pub secret: Option<String>,
    pub port: u16,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            secret: None,
            port: 22,
        }
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("port", &self.port)
            .finish()
    }
}

/// Collector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collection interval in milliseconds, shared by every agent
    pub interval_ms: u64,

    /// Local or remote collection
    pub mode: ConnectionMode,

    /// Remote target, only used in remote mode
    pub target: TargetConfig,

    /// Upper bound for a single command, in milliseconds
    pub command_timeout_ms: u64,

    /// Directory holding one JSON document per monitored target
    pub data_dir: PathBuf,

    /// Interface watched by the network agents
    pub network_interface: String,

    /// Per-agent interval overrides in milliseconds
    pub agent_intervals_ms: BTreeMap<AgentKind, u64>,

    /// How many times a store read or write is attempted before giving up
    pub store_retry_attempts: u32,

    /// First backoff between store attempts, doubled after each failure
    pub store_retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            mode: ConnectionMode::Local,
            target: TargetConfig::default(),
            command_timeout_ms: 15_000,
            data_dir: default_data_dir(),
            network_interface: "wlan0".to_string(),
            agent_intervals_ms: BTreeMap::new(),
            store_retry_attempts: 3,
            store_retry_backoff_ms: 100,
        }
    }
}

const MIN_INTERVAL_MS: u64 = 100;
const MAX_INTERVAL_MS: u64 = 60 * 60 * 1000;

impl Config {
    /// Load configuration from multiple sources in order of preference:
    /// 1. CLI arguments override everything
    /// 2. JSON config file if specified
    /// 3. Default config file locations
    /// 4. Built-in defaults
    ///
    /// File layers only override the fields they name.
    pub fn load(cli_config: Option<&CliConfig>, json_path: Option<&PathBuf>) -> Result<Self> {
        let mut layers = Vec::new();

        if let Some(default_layer) = Self::load_default_layer() {
            layers.push(default_layer);
        }

        if let Some(path) = json_path {
            layers.push(Self::read_layer(path)?);
        }

        let mut config = Self::from_layers(layers)?;

        if let Some(cli) = cli_config {
            config.apply_cli_overrides(cli);
        }

        config.validate()?;
        Ok(config)
    }

    /// Overlay JSON documents on the built-in defaults, later layers winning per field.
    fn from_layers(layers: impl IntoIterator<Item = Value>) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;
        for layer in layers {
            merge_json(&mut merged, layer);
        }

        serde_json::from_value(merged)
            .map_err(|e| CoreError::config(format!("Invalid configuration: {}", e)))
    }

    /// Read one config file, checking it on its own so errors name the file.
    fn read_layer(path: &PathBuf) -> Result<Value> {
        let contents = fs::read_to_string(path).map_err(|e| {
            CoreError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let layer: Value = serde_json::from_str(&contents).map_err(|e| {
            CoreError::config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;
        if !layer.is_object() {
            return Err(CoreError::config(format!(
                "Config file {} must hold a JSON object",
                path.display()
            )));
        }
        Config::deserialize(&layer).map_err(|e| {
            CoreError::config(format!("Invalid config file {}: {}", path.display(), e))
        })?;

        Ok(layer)
    }

    fn load_default_layer() -> Option<Value> {
        for path in Self::default_config_paths() {
            if path.exists() {
                match Self::read_layer(&path) {
                    Ok(layer) => return Some(layer),
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "ignoring unreadable config file"
                        );
                        continue;
                    }
                }
            }
        }

        None
    }

    /// Default configuration file search paths
    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("pimon").join("config.json"));
        }

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".pimon.json"));
        }

        paths.push(PathBuf::from("pimon.json"));

        paths
    }

    fn apply_cli_overrides(&mut self, cli: &CliConfig) {
        if let Some(interval) = cli.interval_ms {
            self.interval_ms = interval;
        }
        if cli.remote {
            self.mode = ConnectionMode::Remote;
        }
        if let Some(host) = &cli.host {
            self.target.host = host.clone();
        }
        if let Some(username) = &cli.username {
            self.target.username = username.clone();
        }
        if let Some(secret) = &cli.secret {
            self.target.secret = Some(secret.clone());
        }
        if let Some(port) = cli.port {
            self.target.port = port;
        }
        if let Some(timeout) = cli.command_timeout_ms {
            self.command_timeout_ms = timeout;
        }
        if let Some(dir) = &cli.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(iface) = &cli.network_interface {
            self.network_interface = iface.clone();
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let intervals = std::iter::once(("interval_ms".to_string(), self.interval_ms)).chain(
            self.agent_intervals_ms
                .iter()
                .map(|(kind, ms)| (format!("agent_intervals_ms.{kind}"), *ms)),
        );
        for (name, ms) in intervals {
            if !(MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&ms) {
                return Err(CoreError::config(format!(
                    "{name} must be between {MIN_INTERVAL_MS} ms and one hour, got {ms}"
                )));
            }
        }

        if self.command_timeout_ms == 0 {
            return Err(CoreError::config("command_timeout_ms must be positive"));
        }

        if self.store_retry_attempts == 0 {
            return Err(CoreError::config("store_retry_attempts must be at least 1"));
        }

        if self.network_interface.trim().is_empty() {
            return Err(CoreError::config("network_interface must not be empty"));
        }

        if self.mode == ConnectionMode::Remote
            && (self.target.host.is_empty() || self.target.username.is_empty())
        {
            return Err(CoreError::config(
                "remote mode needs target.host and target.username",
            ));
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Interval for one agent, honouring its override
    pub fn interval_for(&self, kind: AgentKind) -> Duration {
        let ms = self
            .agent_intervals_ms
            .get(&kind)
            .copied()
            .unwrap_or(self.interval_ms);
        Duration::from_millis(ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.store_retry_attempts,
            initial_backoff: Duration::from_millis(self.store_retry_backoff_ms),
        }
    }
}

/// Recursively overlay `overlay` on `base`; objects merge key by key, anything else replaces.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_json(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("pimon"))
        .unwrap_or_else(|| PathBuf::from("pimon-data"))
}

/// CLI configuration (temporary struct for CLI parsing)
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub interval_ms: Option<u64>,
    pub remote: bool,
    pub host: Option<String>,
    pub username: Option<String>,
    pub secret: Option<String>,
    pub port: Option<u16>,
    pub command_timeout_ms: Option<u64>,
    pub data_dir: Option<PathBuf>,
    pub network_interface: Option<String>,
}
