use super::{decode, CollectorKind, SubCollector};
use async_trait::async_trait;
use mongo_core::bson::doc;
use mongo_core::source::{list_database_names, with_max_time};
use mongo_core::{Result, Session};
use mongo_metrics::{Desc, FamilyGroup, GaugeFamily, Snapshot, SnapshotGaugeSet};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const SUBSYSTEM: &str = "db";
const LABELS: &[&str] = &["db"];

/// Reply of `dbStats` with `scale: 1`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseStats {
    pub db: String,
    pub collections: f64,
    pub objects: f64,
    pub indexes: f64,
    pub data_size: f64,
    pub storage_size: f64,
    pub index_size: f64,
}

struct DatabaseFamilies {
    collections: GaugeFamily,
    objects: GaugeFamily,
    indexes: GaugeFamily,
    data_size: GaugeFamily,
    storage_size: GaugeFamily,
    index_size: GaugeFamily,
}

impl FamilyGroup for DatabaseFamilies {
    fn families(&self) -> Vec<&GaugeFamily> {
        vec![
            &self.collections,
            &self.objects,
            &self.indexes,
            &self.data_size,
            &self.storage_size,
            &self.index_size,
        ]
    }
}

impl DatabaseFamilies {
    fn new() -> Result<Self> {
        Ok(Self {
            collections: GaugeFamily::new(
                SUBSYSTEM,
                "collections_total",
                "Contains a count of the number of collections in that database",
                LABELS,
            )?,
            objects: GaugeFamily::new(
                SUBSYSTEM,
                "objects_total",
                "Contains a count of the number of objects (i.e. documents) in the database across all collections",
                LABELS,
            )?,
            indexes: GaugeFamily::new(
                SUBSYSTEM,
                "indexes_total",
                "Contains a count of the total number of indexes across all collections in the database",
                LABELS,
            )?,
            data_size: GaugeFamily::new(
                SUBSYSTEM,
                "data_size_bytes",
                "The total size in bytes of the data held in this database including the padding factor",
                LABELS,
            )?,
            storage_size: GaugeFamily::new(
                SUBSYSTEM,
                "storage_size_bytes",
                "The total amount of space in bytes allocated to collections in this database for document storage",
                LABELS,
            )?,
            index_size: GaugeFamily::new(
                SUBSYSTEM,
                "index_size_bytes",
                "The total size in bytes of all indexes created on this database",
                LABELS,
            )?,
        })
    }
}

pub struct DatabaseStatusCollector {
    gauges: SnapshotGaugeSet<DatabaseFamilies>,
}

impl DatabaseStatusCollector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            gauges: SnapshotGaugeSet::new(DatabaseFamilies::new()?),
        })
    }
}

async fn database_stats(
    session: &dyn Session,
    database: &str,
    timeout: Duration,
) -> Result<DatabaseStats> {
    let command = with_max_time(doc! { "dbStats": 1, "scale": 1 }, timeout);
    let reply = session.run_command(database, command, timeout).await?;
    let mut stats: DatabaseStats = decode(reply)?;
    if stats.db.is_empty() {
        stats.db = database.to_string();
    }
    Ok(stats)
}

#[async_trait]
impl SubCollector for DatabaseStatusCollector {
    type Payload = Vec<DatabaseStats>;

    fn kind(&self) -> CollectorKind {
        CollectorKind::DatabaseStatus
    }

    fn describe(&self) -> Vec<Desc> {
        self.gauges.describe()
    }

    /// Listing failures abort the variant; a failing database is skipped.
    async fn fetch(&self, session: &dyn Session, timeout: Duration) -> Result<Vec<DatabaseStats>> {
        let mut all = Vec::new();
        for database in list_database_names(session, timeout).await? {
            match database_stats(session, &database, timeout).await {
                Ok(stats) => {
                    debug!("Fetched dbStats for db={}", database);
                    all.push(stats);
                }
                Err(e) => warn!("Skipping dbStats for db={}: {}", database, e),
            }
        }
        Ok(all)
    }

    async fn export(&self, payload: Vec<DatabaseStats>) -> Snapshot {
        self.gauges
            .publish(|g| {
                for stats in &payload {
                    let labels = [stats.db.as_str()];
                    g.collections.set_values(&labels, stats.collections);
                    g.objects.set_values(&labels, stats.objects);
                    g.indexes.set_values(&labels, stats.indexes);
                    g.data_size.set_values(&labels, stats.data_size);
                    g.storage_size.set_values(&labels, stats.storage_size);
                    g.index_size.set_values(&labels, stats.index_size);
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSession;
    use mongo_metrics::LabelSet;

    fn databases() -> mongo_core::bson::Document {
        doc! {
            "databases": [
                { "name": "admin" }, { "name": "shop" }, { "name": "test" }, { "name": "crm" },
            ],
            "ok": 1.0,
        }
    }

    fn db(name: &str) -> LabelSet {
        LabelSet::new([("db", name)])
    }

    #[tokio::test]
    async fn test_skips_admin_and_test() {
        let session = ScriptedSession::new()
            .reply("admin", "listDatabases", databases())
            .reply("shop", "dbStats", doc! { "db": "shop", "collections": 3, "objects": 120_i64, "ok": 1.0 })
            .reply("crm", "dbStats", doc! { "db": "crm", "collections": 1, "dataSize": 2048.0, "ok": 1.0 });
        let collector = DatabaseStatusCollector::new().unwrap();

        let snapshot = collector
            .scrape(&session, Duration::from_secs(1))
            .await
            .unwrap();
        let mut exported = snapshot.label_sets("mongodb_db_collections_total");
        exported.sort();
        assert_eq!(exported, vec![db("crm"), db("shop")]);
        assert_eq!(snapshot.value("mongodb_db_objects_total", &db("shop")), Some(120.0));
        assert_eq!(snapshot.value("mongodb_db_data_size_bytes", &db("crm")), Some(2048.0));
        assert!(!session.calls().contains(&"admin.dbStats".to_string()));
    }

    #[tokio::test]
    async fn test_failing_database_is_skipped() {
        let session = ScriptedSession::new()
            .reply("admin", "listDatabases", databases())
            .fail("shop", "dbStats", "not authorized on shop")
            .reply("crm", "dbStats", doc! { "db": "crm", "collections": 1, "ok": 1.0 });
        let collector = DatabaseStatusCollector::new().unwrap();

        let snapshot = collector
            .scrape(&session, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(snapshot.label_sets("mongodb_db_collections_total"), vec![db("crm")]);
    }

    #[tokio::test]
    async fn test_listing_failure_fails_the_variant() {
        let session = ScriptedSession::new().fail("admin", "listDatabases", "not authorized");
        let collector = DatabaseStatusCollector::new().unwrap();

        assert!(collector.scrape(&session, Duration::from_secs(1)).await.is_err());
    }
}
