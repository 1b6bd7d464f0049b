use crate::config::{ConfigFile, ExporterConfig};
use mongo_core::{ExporterError, Result};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => Err(ExporterError::InvalidConfig(format!(
                "{}: unsupported file format, use .yaml, .yml, .toml or .json",
                path.display()
            ))),
        }
    }

    /// TOML nests the settings under `[exporter]`; YAML and JSON are flat.
    fn decode(self, contents: &str) -> std::result::Result<ExporterConfig, String> {
        match self {
            Self::Yaml => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str::<ConfigFile>(contents)
                .map(|file| file.exporter)
                .map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(contents).map_err(|e| e.to_string()),
        }
    }
}

/// Reads an exporter config, picking the format from the file extension, and
/// validates it.
pub async fn parse_config_from_file(path: impl AsRef<Path>) -> Result<ExporterConfig> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let contents = tokio::fs::read_to_string(path).await?;

    let config = format
        .decode(&contents)
        .map_err(|e| ExporterError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
    config.validate().map_err(ExporterError::InvalidConfig)?;
    Ok(config)
}
