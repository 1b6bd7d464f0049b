pub mod collection_status;
pub mod conn_pool_stats;
pub mod current_op;
pub mod database_status;
pub mod parameters;
pub mod replset_conf;
pub mod replset_status;
pub mod server_status;
pub mod session_cache;
pub mod sharding;
pub mod sharding_statistics;
pub mod top;

use crate::config::ExporterConfig;
use async_trait::async_trait;
use mongo_core::bson::{self, Document};
use mongo_core::{ExporterError, Result, Session};
use mongo_metrics::{Desc, Snapshot};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use collection_status::CollectionStatusCollector;
pub use conn_pool_stats::ConnPoolStatsCollector;
pub use current_op::CurrentOpCollector;
pub use database_status::DatabaseStatusCollector;
pub use parameters::ParametersCollector;
pub use replset_conf::ReplSetConfCollector;
pub use replset_status::ReplSetStatusCollector;
pub use server_status::ServerStatusCollector;
pub use session_cache::SessionCacheCollector;
pub use sharding::ShardingCollector;
pub use sharding_statistics::ShardingStatisticsCollector;
pub use top::TopStatusCollector;

/// Tag of every sub-collector. `ALL` is also the order a pull runs them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorKind {
    CurrentOp,
    ServerStatus,
    ShardingStatistics,
    Sharding,
    SessionCache,
    ReplSetStatus,
    ReplSetConf,
    TopStatus,
    DatabaseStatus,
    CollectionStatus,
    ConnPoolStats,
    Parameters,
}

impl CollectorKind {
    pub const ALL: [CollectorKind; 12] = [
        CollectorKind::CurrentOp,
        CollectorKind::ServerStatus,
        CollectorKind::ShardingStatistics,
        CollectorKind::Sharding,
        CollectorKind::SessionCache,
        CollectorKind::ReplSetStatus,
        CollectorKind::ReplSetConf,
        CollectorKind::TopStatus,
        CollectorKind::DatabaseStatus,
        CollectorKind::CollectionStatus,
        CollectorKind::ConnPoolStats,
        CollectorKind::Parameters,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CollectorKind::CurrentOp => "current_op",
            CollectorKind::ServerStatus => "server_status",
            CollectorKind::ShardingStatistics => "sharding_statistics",
            CollectorKind::Sharding => "sharding",
            CollectorKind::SessionCache => "session_cache",
            CollectorKind::ReplSetStatus => "repl_set_status",
            CollectorKind::ReplSetConf => "repl_set_conf",
            CollectorKind::TopStatus => "top_status",
            CollectorKind::DatabaseStatus => "database_status",
            CollectorKind::CollectionStatus => "collection_status",
            CollectorKind::ConnPoolStats => "conn_pool_stats",
            CollectorKind::Parameters => "parameters",
        }
    }

    /// Collectors that walk every database or are costly run only on request.
    pub fn enabled_by_default(&self) -> bool {
        !matches!(
            self,
            CollectorKind::TopStatus
                | CollectorKind::DatabaseStatus
                | CollectorKind::CollectionStatus
                | CollectorKind::ConnPoolStats
                | CollectorKind::Parameters
        )
    }

    pub fn defaults() -> Vec<CollectorKind> {
        Self::ALL
            .into_iter()
            .filter(CollectorKind::enabled_by_default)
            .collect()
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CollectorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.name()).collect();
                format!("Unknown collector '{}' (known: {})", s, known.join(", "))
            })
    }
}

/// One diagnostic payload's fetch-and-map cycle.
#[async_trait]
pub trait SubCollector: Send + Sync {
    type Payload: Send + 'static;

    fn kind(&self) -> CollectorKind;

    fn describe(&self) -> Vec<Desc>;

    async fn fetch(&self, session: &dyn Session, timeout: Duration) -> Result<Self::Payload>;

    async fn export(&self, payload: Self::Payload) -> Snapshot;

    async fn scrape(&self, session: &dyn Session, timeout: Duration) -> Result<Snapshot> {
        let payload = self.fetch(session, timeout).await?;
        Ok(self.export(payload).await)
    }
}

/// The closed set of sub-collectors a coordinator can run.
pub enum Collector {
    CurrentOp(CurrentOpCollector),
    ServerStatus(ServerStatusCollector),
    ShardingStatistics(ShardingStatisticsCollector),
    Sharding(ShardingCollector),
    SessionCache(SessionCacheCollector),
    ReplSetStatus(ReplSetStatusCollector),
    ReplSetConf(ReplSetConfCollector),
    TopStatus(TopStatusCollector),
    DatabaseStatus(DatabaseStatusCollector),
    CollectionStatus(CollectionStatusCollector),
    ConnPoolStats(ConnPoolStatsCollector),
    Parameters(ParametersCollector),
}

macro_rules! dispatch {
    ($self:ident, $inner:ident => $body:expr) => {
        match $self {
            Collector::CurrentOp($inner) => $body,
            Collector::ServerStatus($inner) => $body,
            Collector::ShardingStatistics($inner) => $body,
            Collector::Sharding($inner) => $body,
            Collector::SessionCache($inner) => $body,
            Collector::ReplSetStatus($inner) => $body,
            Collector::ReplSetConf($inner) => $body,
            Collector::TopStatus($inner) => $body,
            Collector::DatabaseStatus($inner) => $body,
            Collector::CollectionStatus($inner) => $body,
            Collector::ConnPoolStats($inner) => $body,
            Collector::Parameters($inner) => $body,
        }
    };
}

impl Collector {
    pub fn new(kind: CollectorKind, config: &ExporterConfig) -> Result<Self> {
        Ok(match kind {
            CollectorKind::CurrentOp => Collector::CurrentOp(CurrentOpCollector::new()?),
            CollectorKind::ServerStatus => Collector::ServerStatus(ServerStatusCollector::new()?),
            CollectorKind::ShardingStatistics => {
                Collector::ShardingStatistics(ShardingStatisticsCollector::new()?)
            }
            CollectorKind::Sharding => Collector::Sharding(ShardingCollector::new()?),
            CollectorKind::SessionCache => Collector::SessionCache(SessionCacheCollector::new()?),
            CollectorKind::ReplSetStatus => {
                Collector::ReplSetStatus(ReplSetStatusCollector::new()?)
            }
            CollectorKind::ReplSetConf => Collector::ReplSetConf(ReplSetConfCollector::new()?),
            CollectorKind::TopStatus => Collector::TopStatus(TopStatusCollector::new()?),
            CollectorKind::DatabaseStatus => {
                Collector::DatabaseStatus(DatabaseStatusCollector::new()?)
            }
            CollectorKind::CollectionStatus => {
                Collector::CollectionStatus(CollectionStatusCollector::new()?)
            }
            CollectorKind::ConnPoolStats => {
                Collector::ConnPoolStats(ConnPoolStatsCollector::new()?)
            }
            CollectorKind::Parameters => {
                Collector::Parameters(ParametersCollector::new(&config.parameters)?)
            }
        })
    }

    /// The enabled collectors of `config`, in pull order.
    pub fn enabled(config: &ExporterConfig) -> Result<Vec<Self>> {
        CollectorKind::ALL
            .into_iter()
            .filter(|kind| config.collectors.contains(kind))
            .map(|kind| Self::new(kind, config))
            .collect()
    }

    pub fn kind(&self) -> CollectorKind {
        dispatch!(self, c => c.kind())
    }

    pub fn describe(&self) -> Vec<Desc> {
        dispatch!(self, c => c.describe())
    }

    pub async fn scrape(&self, session: &dyn Session, timeout: Duration) -> Result<Snapshot> {
        dispatch!(self, c => c.scrape(session, timeout).await)
    }
}

pub(crate) fn decode<T: DeserializeOwned>(document: Document) -> Result<T> {
    Ok(bson::from_document(document)?)
}

/// Decodes sub-document `key`; absent sections are reported as such.
pub(crate) fn decode_section<T: DeserializeOwned>(
    document: &Document,
    key: &'static str,
) -> Result<T> {
    match document.get_document(key) {
        Ok(section) => decode(section.clone()),
        Err(bson::document::ValueAccessError::NotPresent) => {
            Err(ExporterError::MissingSection(key))
        }
        Err(e) => Err(e.into()),
    }
}

/// Standalone servers reject replica-set commands; that is an absent section,
/// not a failure worth a warning.
pub(crate) fn replication_disabled(error: ExporterError, section: &'static str) -> ExporterError {
    match &error {
        ExporterError::Command { message, .. }
            if message.contains("--replSet") || message.contains("NoReplicationEnabled") =>
        {
            ExporterError::MissingSection(section)
        }
        _ => error,
    }
}

pub(crate) fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

pub(crate) fn millis_to_seconds(millis: f64) -> f64 {
    millis / 1e3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("top_status".parse::<CollectorKind>(), Ok(CollectorKind::TopStatus));
        assert_eq!("Repl-Set-Conf".parse::<CollectorKind>(), Ok(CollectorKind::ReplSetConf));
        assert!("oplog".parse::<CollectorKind>().is_err());
    }

    #[test]
    fn test_defaults_keep_pull_order() {
        assert_eq!(
            CollectorKind::defaults(),
            vec![
                CollectorKind::CurrentOp,
                CollectorKind::ServerStatus,
                CollectorKind::ShardingStatistics,
                CollectorKind::Sharding,
                CollectorKind::SessionCache,
                CollectorKind::ReplSetStatus,
                CollectorKind::ReplSetConf,
            ]
        );
    }

    #[test]
    fn test_every_kind_builds_and_describes() {
        let config = ExporterConfig::builder().collectors(CollectorKind::ALL.to_vec()).build();
        let collectors = Collector::enabled(&config).unwrap();

        assert_eq!(collectors.len(), CollectorKind::ALL.len());
        for (collector, kind) in collectors.iter().zip(CollectorKind::ALL) {
            assert_eq!(collector.kind(), kind);
            assert!(!collector.describe().is_empty(), "{} has no families", kind);
        }
    }

    #[test]
    fn test_family_names_are_unique() {
        let config = ExporterConfig::builder().collectors(CollectorKind::ALL.to_vec()).build();
        let mut names: Vec<String> = Collector::enabled(&config)
            .unwrap()
            .iter()
            .flat_map(|c| c.describe())
            .map(|d| d.fq_name)
            .collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_standalone_replica_errors_become_absent_sections() {
        let standalone = ExporterError::command("replSetGetStatus", "not running with --replSet");
        assert!(matches!(
            replication_disabled(standalone, "replSetGetStatus"),
            ExporterError::MissingSection("replSetGetStatus")
        ));

        let denied = ExporterError::command("replSetGetStatus", "not authorized on admin");
        assert!(matches!(
            replication_disabled(denied, "replSetGetStatus"),
            ExporterError::Command { .. }
        ));
    }

    #[test]
    fn test_decode_section_reports_absence() {
        let document = bson::doc! { "sharding": { "maxChunkSizeInBytes": 1 } };
        let result: Result<Document> = decode_section(&document, "shardingStatistics");
        assert!(matches!(result, Err(ExporterError::MissingSection("shardingStatistics"))));
    }
}
