use crate::collectors::parameters::is_known_parameter;
use crate::collectors::CollectorKind;
use mongo_core::mongo::redact_uri;
use mongo_core::SessionOptions;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

pub const DEFAULT_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:9001";
pub const DEFAULT_TELEMETRY_PATH: &str = "/metrics";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PARAMETERS: &[&str] = &["cursorTimeoutMillis"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExporterConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_telemetry_path")]
    pub telemetry_path: String,
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_command_timeout")]
    pub command_timeout: Duration,
    #[serde(default)]
    pub collectors: CollectorSet,
    #[serde(default = "default_parameters")]
    pub parameters: Vec<String>,
}

/// TOML files nest everything under `[exporter]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub exporter: ExporterConfig,
}

fn default_uri() -> String {
    DEFAULT_URI.to_string()
}

fn default_listen_address() -> String {
    DEFAULT_LISTEN_ADDRESS.to_string()
}

fn default_telemetry_path() -> String {
    DEFAULT_TELEMETRY_PATH.to_string()
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_command_timeout() -> Duration {
    DEFAULT_COMMAND_TIMEOUT
}

fn default_parameters() -> Vec<String> {
    DEFAULT_PARAMETERS.iter().map(|s| s.to_string()).collect()
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            listen_address: default_listen_address(),
            telemetry_path: default_telemetry_path(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            collectors: CollectorSet::default(),
            parameters: default_parameters(),
        }
    }
}

impl ExporterConfig {
    pub fn builder() -> ExporterConfigBuilder {
        ExporterConfigBuilder::default()
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::new(self.uri.clone(), self.connect_timeout)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.uri.trim().is_empty() {
            return Err("MongoDB URI cannot be empty".to_string());
        }

        if !self.uri.starts_with("mongodb://") && !self.uri.starts_with("mongodb+srv://") {
            return Err(format!(
                "MongoDB URI must start with mongodb:// or mongodb+srv:// (got '{}')",
                redact_uri(&self.uri)
            ));
        }

        if self.listen_address.trim().is_empty() {
            return Err("Listen address cannot be empty".to_string());
        }

        if !self.telemetry_path.starts_with('/') {
            return Err(format!(
                "Telemetry path '{}' must start with '/'",
                self.telemetry_path
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be > 0".to_string());
        }

        if self.command_timeout.is_zero() {
            return Err("command_timeout must be > 0".to_string());
        }

        for name in &self.parameters {
            if !is_known_parameter(name) {
                return Err(format!("Unknown server parameter '{}'", name));
            }
        }

        Ok(())
    }
}

/// Which sub-collectors run. Serialized as `kind: bool` pairs; kinds left
/// out of a file keep their default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorSet(BTreeSet<CollectorKind>);

impl CollectorSet {
    pub fn contains(&self, kind: &CollectorKind) -> bool {
        self.0.contains(kind)
    }

    pub fn set(&mut self, kind: CollectorKind, enabled: bool) {
        if enabled {
            self.0.insert(kind);
        } else {
            self.0.remove(&kind);
        }
    }

    /// Enabled kinds, in pull order.
    pub fn kinds(&self) -> Vec<CollectorKind> {
        CollectorKind::ALL
            .into_iter()
            .filter(|kind| self.contains(kind))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for CollectorSet {
    fn default() -> Self {
        Self(CollectorKind::defaults().into_iter().collect())
    }
}

impl FromIterator<CollectorKind> for CollectorSet {
    fn from_iter<I: IntoIterator<Item = CollectorKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for CollectorSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(CollectorKind::ALL.len()))?;
        for kind in CollectorKind::ALL {
            map.serialize_entry(kind.name(), &self.contains(&kind))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CollectorSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let toggles = BTreeMap::<String, bool>::deserialize(deserializer)?;
        let mut set = CollectorSet::default();
        for (name, enabled) in toggles {
            let kind = name.parse::<CollectorKind>().map_err(D::Error::custom)?;
            set.set(kind, enabled);
        }
        Ok(set)
    }
}

#[derive(Default)]
pub struct ExporterConfigBuilder {
    uri: Option<String>,
    listen_address: Option<String>,
    telemetry_path: Option<String>,
    connect_timeout: Option<Duration>,
    command_timeout: Option<Duration>,
    collectors: Option<CollectorSet>,
    toggles: Vec<(CollectorKind, bool)>,
    parameters: Option<Vec<String>>,
}

impl ExporterConfigBuilder {
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn listen_address(mut self, address: impl Into<String>) -> Self {
        self.listen_address = Some(address.into());
        self
    }

    pub fn telemetry_path(mut self, path: impl Into<String>) -> Self {
        self.telemetry_path = Some(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Replaces the whole enabled set.
    pub fn collectors(mut self, kinds: Vec<CollectorKind>) -> Self {
        self.collectors = Some(kinds.into_iter().collect());
        self
    }

    /// Flips one kind on top of the defaults (or of `collectors`).
    pub fn collector(mut self, kind: CollectorKind, enabled: bool) -> Self {
        self.toggles.push((kind, enabled));
        self
    }

    pub fn parameter(mut self, name: impl Into<String>) -> Self {
        self.parameters
            .get_or_insert_with(Vec::new)
            .push(name.into());
        self
    }

    pub fn build(self) -> ExporterConfig {
        let mut collectors = self.collectors.unwrap_or_default();
        for (kind, enabled) in self.toggles {
            collectors.set(kind, enabled);
        }

        ExporterConfig {
            uri: self.uri.unwrap_or_else(default_uri),
            listen_address: self.listen_address.unwrap_or_else(default_listen_address),
            telemetry_path: self.telemetry_path.unwrap_or_else(default_telemetry_path),
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            command_timeout: self.command_timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT),
            collectors,
            parameters: self.parameters.unwrap_or_else(default_parameters),
        }
    }
}

pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
