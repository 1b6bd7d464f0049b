use super::{decode_section, CollectorKind, SubCollector};
use async_trait::async_trait;
use mongo_core::bson::doc;
use mongo_core::source::with_max_time;
use mongo_core::{Result, Session};
use mongo_metrics::{Desc, FamilyGroup, GaugeFamily, Snapshot, SnapshotGaugeSet};
use serde::Deserialize;
use std::time::Duration;

const SUBSYSTEM: &str = "sharding_statistics";

/// `(name, help)` of every gauge, in the order of [`ShardingStatistics::values`].
const GAUGES: [(&str, &str); 14] = [
    (
        "count_stale_config_errors_total",
        "The total number of times that threads hit stale config exception. Since a stale config exception triggers a refresh of the metadata, this number is roughly proportional to the number of metadata refreshes.",
    ),
    (
        "count_donor_move_chunk_started_total",
        "The total number of times that the moveChunk command has started on the shard, of which this node is a member, as part of a chunk migration process.",
    ),
    (
        "total_donor_chunk_clone_time_milliseconds",
        "The cumulative time, in milliseconds, taken by the clone phase of the chunk migrations from this shard, of which this node is a member.",
    ),
    (
        "total_critical_section_commit_time_milliseconds",
        "The cumulative time, in milliseconds, taken by the update metadata phase of the chunk migrations from this shard, of which this node is a member.",
    ),
    (
        "total_critical_section_time_milliseconds",
        "The cumulative time, in milliseconds, taken by the catch-up phase and the update metadata phase of the chunk migrations from this shard, of which this node is a member.",
    ),
    (
        "catalog_cache_num_database_entries",
        "The total number of database entries that are currently in the catalog cache.",
    ),
    (
        "catalog_cache_num_collection_entries",
        "The total number of collection entries (across all databases) that are currently in the catalog cache.",
    ),
    (
        "catalog_cache_count_stale_config_errors",
        "The total number of times that threads hit stale config exception. A stale config exception triggers a refresh of the metadata.",
    ),
    (
        "catalog_cache_total_refresh_wait_time_microseconds",
        "The cumulative time, in microseconds, that threads had to wait for a refresh of the metadata.",
    ),
    (
        "catalog_cache_num_active_incremental_refreshes",
        "The number of incremental catalog cache refreshes that are currently waiting to complete.",
    ),
    (
        "catalog_cache_count_incremental_refreshes_started",
        "The cumulative number of incremental refreshes that have started.",
    ),
    (
        "catalog_cache_num_active_full_refreshes",
        "The number of full catalog cache refreshes that are currently waiting to complete.",
    ),
    (
        "catalog_cache_count_full_refreshes_started",
        "The cumulative number of full refreshes that have started.",
    ),
    (
        "catalog_cache_count_failed_refreshes",
        "The cumulative number of full or incremental refreshes that have failed.",
    ),
];

/// The `shardingStatistics` section of `serverStatus`, only present on shard members.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShardingStatistics {
    pub count_stale_config_errors: f64,
    pub count_donor_move_chunk_started: f64,
    pub total_donor_chunk_clone_time_millis: f64,
    pub total_critical_section_commit_time_millis: f64,
    pub total_critical_section_time_millis: f64,
    pub catalog_cache: CatalogCache,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CatalogCache {
    pub num_database_entries: f64,
    pub num_collection_entries: f64,
    pub count_stale_config_errors: f64,
    pub total_refresh_wait_time_micros: f64,
    pub num_active_incremental_refreshes: f64,
    pub count_incremental_refreshes_started: f64,
    pub num_active_full_refreshes: f64,
    pub count_full_refreshes_started: f64,
    pub count_failed_refreshes: f64,
}

impl ShardingStatistics {
    fn values(&self) -> [f64; 14] {
        let cache = &self.catalog_cache;
        [
            self.count_stale_config_errors,
            self.count_donor_move_chunk_started,
            self.total_donor_chunk_clone_time_millis,
            self.total_critical_section_commit_time_millis,
            self.total_critical_section_time_millis,
            cache.num_database_entries,
            cache.num_collection_entries,
            cache.count_stale_config_errors,
            cache.total_refresh_wait_time_micros,
            cache.num_active_incremental_refreshes,
            cache.count_incremental_refreshes_started,
            cache.num_active_full_refreshes,
            cache.count_full_refreshes_started,
            cache.count_failed_refreshes,
        ]
    }
}

struct ShardingStatisticsFamilies(Vec<GaugeFamily>);

impl FamilyGroup for ShardingStatisticsFamilies {
    fn families(&self) -> Vec<&GaugeFamily> {
        self.0.iter().collect()
    }
}

pub struct ShardingStatisticsCollector {
    gauges: SnapshotGaugeSet<ShardingStatisticsFamilies>,
}

impl ShardingStatisticsCollector {
    pub fn new() -> Result<Self> {
        let families = GAUGES
            .iter()
            .map(|(name, help)| GaugeFamily::new(SUBSYSTEM, name, help, &[]))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            gauges: SnapshotGaugeSet::new(ShardingStatisticsFamilies(families)),
        })
    }
}

#[async_trait]
impl SubCollector for ShardingStatisticsCollector {
    type Payload = ShardingStatistics;

    fn kind(&self) -> CollectorKind {
        CollectorKind::ShardingStatistics
    }

    fn describe(&self) -> Vec<Desc> {
        self.gauges.describe()
    }

    async fn fetch(&self, session: &dyn Session, timeout: Duration) -> Result<ShardingStatistics> {
        let command = with_max_time(doc! { "serverStatus": 1 }, timeout);
        let reply = session.run_command("admin", command, timeout).await?;
        decode_section(&reply, "shardingStatistics")
    }

    async fn export(&self, payload: ShardingStatistics) -> Snapshot {
        self.gauges
            .publish(|g| {
                for (family, value) in g.0.iter().zip(payload.values()) {
                    family.set_values(&[], value);
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSession;
    use mongo_core::ExporterError;
    use mongo_metrics::LabelSet;

    #[tokio::test]
    async fn test_sharding_statistics_mapping() {
        let session = ScriptedSession::new().reply(
            "admin",
            "serverStatus",
            doc! {
                "shardingStatistics": {
                    "countStaleConfigErrors": 3_i64,
                    "totalDonorChunkCloneTimeMillis": 1500_i64,
                    "catalogCache": { "numDatabaseEntries": 2_i64, "countFailedRefreshes": 1_i64 },
                },
                "ok": 1.0,
            },
        );
        let collector = ShardingStatisticsCollector::new().unwrap();

        let snapshot = collector
            .scrape(&session, Duration::from_secs(1))
            .await
            .unwrap();
        let none = LabelSet::empty();
        assert_eq!(snapshot.families().len(), GAUGES.len());
        assert_eq!(
            snapshot.value("mongodb_sharding_statistics_count_stale_config_errors_total", &none),
            Some(3.0)
        );
        assert_eq!(
            snapshot.value("mongodb_sharding_statistics_total_donor_chunk_clone_time_milliseconds", &none),
            Some(1500.0)
        );
        assert_eq!(
            snapshot.value("mongodb_sharding_statistics_catalog_cache_count_failed_refreshes", &none),
            Some(1.0)
        );
    }

    #[tokio::test]
    async fn test_unsharded_server_reports_missing_section() {
        let session =
            ScriptedSession::new().reply("admin", "serverStatus", doc! { "uptime": 1, "ok": 1.0 });
        let collector = ShardingStatisticsCollector::new().unwrap();

        let result = collector.scrape(&session, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ExporterError::MissingSection("shardingStatistics"))));
    }

    #[test]
    fn test_table_matches_payload_width() {
        assert_eq!(GAUGES.len(), ShardingStatistics::default().values().len());
    }
}
