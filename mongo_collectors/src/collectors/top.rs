use super::{decode, CollectorKind, SubCollector};
use async_trait::async_trait;
use mongo_core::bson::{doc, Bson, Document};
use mongo_core::{Result, Session};
use mongo_metrics::{
    CategoryAggregator, Desc, FamilyGroup, GaugeFamily, OpCategory, OpStat, Snapshot,
    SnapshotGaugeSet,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Per-operation usage of one namespace, as reported by `top`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TopStats {
    pub total: OpStat,
    pub read_lock: OpStat,
    pub write_lock: OpStat,
    pub queries: OpStat,
    #[serde(rename = "getmore")]
    pub get_more: OpStat,
    pub insert: OpStat,
    pub update: OpStat,
    pub remove: OpStat,
    pub commands: OpStat,
}

impl TopStats {
    pub fn entries(&self) -> [(&'static str, OpStat); 9] {
        [
            ("Total", self.total),
            ("ReadLock", self.read_lock),
            ("WriteLock", self.write_lock),
            ("Queries", self.queries),
            ("GetMore", self.get_more),
            ("Insert", self.insert),
            ("Update", self.update),
            ("Remove", self.remove),
            ("Commands", self.commands),
        ]
    }
}

/// `top` totals keyed by `database.collection`.
#[derive(Debug, Clone, Default)]
pub struct TopStatus {
    pub namespaces: BTreeMap<String, TopStats>,
}

impl TopStatus {
    fn from_reply(reply: &Document) -> Result<Self> {
        let mut namespaces = BTreeMap::new();
        for (namespace, entry) in reply.get_document("totals")? {
            // `totals` also carries a free-text `note`.
            let Bson::Document(entry) = entry else {
                continue;
            };
            namespaces.insert(namespace.clone(), decode(entry.clone())?);
        }
        Ok(Self { namespaces })
    }
}

/// Splits `db.coll.with.dots` at the first dot.
pub fn split_namespace(namespace: &str) -> (&str, &str) {
    namespace.split_once('.').unwrap_or((namespace, ""))
}

struct TopFamilies {
    time: GaugeFamily,
    count: GaugeFamily,
    time_aggregate: GaugeFamily,
    count_aggregate: GaugeFamily,
}

impl FamilyGroup for TopFamilies {
    fn families(&self) -> Vec<&GaugeFamily> {
        vec![
            &self.time,
            &self.count,
            &self.time_aggregate,
            &self.count_aggregate,
        ]
    }
}

pub struct TopStatusCollector {
    gauges: SnapshotGaugeSet<TopFamilies>,
}

impl TopStatusCollector {
    pub fn new() -> Result<Self> {
        let families = TopFamilies {
            time: GaugeFamily::new(
                "",
                "top_time_seconds_total",
                "The top command provides operation time, in seconds, for each database collection",
                &["type", "database", "collection"],
            )?,
            count: GaugeFamily::new(
                "",
                "top_count_total",
                "The top command provides operation count for each database collection",
                &["type", "database", "collection"],
            )?,
            time_aggregate: GaugeFamily::new(
                "",
                "top_time_seconds_aggregate_total",
                "An aggregate counter for top time seconds for read/write (does not include locks)",
                &["type"],
            )?,
            count_aggregate: GaugeFamily::new(
                "",
                "top_count_aggregate_total",
                "An aggregate counter for top operations for read/write (does not include locks)",
                &["type"],
            )?,
        };
        Ok(Self {
            gauges: SnapshotGaugeSet::new(families),
        })
    }
}

fn fill(g: &TopFamilies, status: &TopStatus) {
    let mut aggregator = CategoryAggregator::new();
    for (namespace, stats) in &status.namespaces {
        let (database, collection) = split_namespace(namespace);
        for series in aggregator.add(stats.entries()) {
            let labels = [series.op_type.as_str(), database, collection];
            g.time.set_values(&labels, series.seconds);
            g.count.set_values(&labels, series.count);
        }
    }

    let totals = aggregator.totals();
    for category in OpCategory::ALL {
        let bucket = totals.get(category);
        g.time_aggregate
            .set_values(&[category.as_str()], bucket.seconds);
        g.count_aggregate
            .set_values(&[category.as_str()], bucket.count);
    }
}

#[async_trait]
impl SubCollector for TopStatusCollector {
    type Payload = TopStatus;

    fn kind(&self) -> CollectorKind {
        CollectorKind::TopStatus
    }

    fn describe(&self) -> Vec<Desc> {
        self.gauges.describe()
    }

    async fn fetch(&self, session: &dyn Session, timeout: Duration) -> Result<TopStatus> {
        let reply = session
            .run_command("admin", doc! { "top": 1 }, timeout)
            .await?;
        TopStatus::from_reply(&reply)
    }

    async fn export(&self, payload: TopStatus) -> Snapshot {
        self.gauges.publish(|g| fill(g, &payload)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSession;
    use mongo_metrics::LabelSet;

    fn top_reply() -> Document {
        doc! {
            "totals": {
                "note": "all times in microseconds",
                "shop.orders": {
                    "total": { "time": 4_000_000_i64, "count": 10_i64 },
                    "writeLock": { "time": 500_000_i64, "count": 1_i64 },
                    "queries": { "time": 2_000_000_i64, "count": 4_i64 },
                    "insert": { "time": 1_000_000_i64, "count": 2_i64 },
                },
                "shop.system.profile": {
                    "getmore": { "time": 1_000_000_i64, "count": 1_i64 },
                    "remove": { "time": 500_000_i64, "count": 3_i64 },
                },
            },
            "ok": 1.0,
        }
    }

    fn op(op_type: &str, collection: &str) -> LabelSet {
        LabelSet::new([("type", op_type), ("database", "shop"), ("collection", collection)])
    }

    #[test]
    fn test_split_namespace() {
        assert_eq!(split_namespace("shop.orders"), ("shop", "orders"));
        assert_eq!(split_namespace("shop.system.profile"), ("shop", "system.profile"));
        assert_eq!(split_namespace("local"), ("local", ""));
    }

    #[tokio::test]
    async fn test_per_namespace_series() {
        let session = ScriptedSession::new().reply("admin", "top", top_reply());
        let collector = TopStatusCollector::new().unwrap();

        let snapshot = collector
            .scrape(&session, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(
            snapshot.value("mongodb_top_time_seconds_total", &op("Queries", "orders")),
            Some(2.0)
        );
        assert_eq!(
            snapshot.value("mongodb_top_count_total", &op("WriteLock", "orders")),
            Some(1.0)
        );
        assert_eq!(
            snapshot.value("mongodb_top_count_total", &op("GetMore", "system.profile")),
            Some(1.0)
        );
        // Every operation type is exported for every namespace.
        assert_eq!(snapshot.label_sets("mongodb_top_count_total").len(), 18);
    }

    #[tokio::test]
    async fn test_aggregates_exclude_locks() {
        let session = ScriptedSession::new().reply("admin", "top", top_reply());
        let collector = TopStatusCollector::new().unwrap();

        let snapshot = collector
            .scrape(&session, Duration::from_secs(1))
            .await
            .unwrap();
        let bucket = |t: &str| LabelSet::new([("type", t)]);
        assert_eq!(
            snapshot.value("mongodb_top_time_seconds_aggregate_total", &bucket("Read")),
            Some(3.0)
        );
        assert_eq!(
            snapshot.value("mongodb_top_count_aggregate_total", &bucket("Read")),
            Some(5.0)
        );
        assert_eq!(
            snapshot.value("mongodb_top_time_seconds_aggregate_total", &bucket("Write")),
            Some(1.5)
        );
        assert_eq!(
            snapshot.value("mongodb_top_count_aggregate_total", &bucket("Write")),
            Some(5.0)
        );
    }

    #[tokio::test]
    async fn test_missing_totals_is_an_error() {
        let session = ScriptedSession::new().reply("admin", "top", doc! { "ok": 1.0 });
        let collector = TopStatusCollector::new().unwrap();

        assert!(collector.scrape(&session, Duration::from_secs(1)).await.is_err());
    }
}
