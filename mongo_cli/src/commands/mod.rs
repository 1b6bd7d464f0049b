pub mod list;
pub mod scrape;
pub mod serve;
pub mod validate;

use crate::ConfigArgs;
use anyhow::Result;
use mongo_collectors::{parse_config_from_file, ExporterConfig, ScrapeCoordinator};
use mongo_core::{ExporterError, MongoDataSource};
use std::sync::Arc;
use tracing::info;

/// Config file (or defaults) with command-line overrides applied, validated.
pub async fn load_config(args: ConfigArgs) -> Result<ExporterConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            parse_config_from_file(path).await?
        }
        None => ExporterConfig::default(),
    };

    if let Some(uri) = args.uri {
        config.uri = uri;
    }
    if let Some(timeout) = args.command_timeout {
        config.command_timeout = timeout;
    }
    if let Some(timeout) = args.connect_timeout {
        config.connect_timeout = timeout;
    }
    for kind in args.collect {
        config.collectors.set(kind, true);
    }
    for kind in args.no_collect {
        config.collectors.set(kind, false);
    }

    config.validate().map_err(ExporterError::InvalidConfig)?;
    Ok(config)
}

pub fn build_coordinator(config: &ExporterConfig) -> Result<ScrapeCoordinator> {
    let source = Arc::new(MongoDataSource::new(config.session_options()));
    Ok(ScrapeCoordinator::from_config(config, source)?)
}
