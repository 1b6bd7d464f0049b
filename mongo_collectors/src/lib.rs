pub mod collectors;
pub mod config;
pub mod parser;
pub mod runner;

#[cfg(test)]
mod testing;

pub use collectors::{Collector, CollectorKind, SubCollector};
pub use config::{CollectorSet, ConfigFile, ExporterConfig};
pub use parser::parse_config_from_file;
pub use runner::{CollectorRun, RunOutcome, ScrapeCoordinator, ScrapeReport};
