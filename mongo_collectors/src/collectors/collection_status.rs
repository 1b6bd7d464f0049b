use super::{decode, CollectorKind, SubCollector};
use async_trait::async_trait;
use mongo_core::bson::doc;
use mongo_core::source::{list_collection_names, list_database_names, with_max_time};
use mongo_core::{Result, Session};
use mongo_metrics::{Desc, FamilyGroup, GaugeFamily, Snapshot, SnapshotGaugeSet};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

const SUBSYSTEM: &str = "collection";
const LABELS: &[&str] = &["ns"];

/// Reply of `collStats` with `scale: 1`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollectionStats {
    pub ns: String,
    pub count: f64,
    pub size: f64,
    pub avg_obj_size: f64,
    pub storage_size: f64,
    pub total_index_size: f64,
}

struct CollectionFamilies {
    count: GaugeFamily,
    size: GaugeFamily,
    avg_obj_size: GaugeFamily,
    storage_size: GaugeFamily,
    index_size: GaugeFamily,
}

impl FamilyGroup for CollectionFamilies {
    fn families(&self) -> Vec<&GaugeFamily> {
        vec![
            &self.count,
            &self.size,
            &self.avg_obj_size,
            &self.storage_size,
            &self.index_size,
        ]
    }
}

pub struct CollectionStatusCollector {
    gauges: SnapshotGaugeSet<CollectionFamilies>,
}

impl CollectionStatusCollector {
    pub fn new() -> Result<Self> {
        let families = CollectionFamilies {
            count: GaugeFamily::new(
                SUBSYSTEM,
                "total_objects",
                "The number of objects or documents in this collection",
                LABELS,
            )?,
            size: GaugeFamily::new(
                SUBSYSTEM,
                "size_bytes",
                "The total size in memory of all records in a collection",
                LABELS,
            )?,
            avg_obj_size: GaugeFamily::new(
                SUBSYSTEM,
                "avg_objsize_bytes",
                "The average size of an object in the collection",
                LABELS,
            )?,
            storage_size: GaugeFamily::new(
                SUBSYSTEM,
                "storage_size_bytes",
                "The total amount of storage allocated to this collection for document storage",
                LABELS,
            )?,
            index_size: GaugeFamily::new(
                SUBSYSTEM,
                "index_size_bytes",
                "The total size of all indexes",
                LABELS,
            )?,
        };
        Ok(Self {
            gauges: SnapshotGaugeSet::new(families),
        })
    }
}

async fn collection_stats(
    session: &dyn Session,
    database: &str,
    collection: &str,
    timeout: Duration,
) -> Result<CollectionStats> {
    let command = with_max_time(doc! { "collStats": collection, "scale": 1 }, timeout);
    let reply = session.run_command(database, command, timeout).await?;
    let mut stats: CollectionStats = decode(reply)?;
    if stats.ns.is_empty() {
        stats.ns = format!("{}.{}", database, collection);
    }
    Ok(stats)
}

#[async_trait]
impl SubCollector for CollectionStatusCollector {
    type Payload = Vec<CollectionStats>;

    fn kind(&self) -> CollectorKind {
        CollectorKind::CollectionStatus
    }

    fn describe(&self) -> Vec<Desc> {
        self.gauges.describe()
    }

    async fn fetch(&self, session: &dyn Session, timeout: Duration) -> Result<Vec<CollectionStats>> {
        let mut all = Vec::new();
        for database in list_database_names(session, timeout).await? {
            let collections = match list_collection_names(session, &database, timeout).await {
                Ok(collections) => collections,
                Err(e) => {
                    warn!("Skipping collections of db={}: {}", database, e);
                    continue;
                }
            };
            for collection in collections {
                match collection_stats(session, &database, &collection, timeout).await {
                    Ok(stats) => all.push(stats),
                    Err(e) => warn!("Skipping collStats for {}.{}: {}", database, collection, e),
                }
            }
        }
        Ok(all)
    }

    async fn export(&self, payload: Vec<CollectionStats>) -> Snapshot {
        self.gauges
            .publish(|g| {
                for stats in &payload {
                    let labels = [stats.ns.as_str()];
                    g.count.set_values(&labels, stats.count);
                    g.size.set_values(&labels, stats.size);
                    g.avg_obj_size.set_values(&labels, stats.avg_obj_size);
                    g.storage_size.set_values(&labels, stats.storage_size);
                    g.index_size.set_values(&labels, stats.total_index_size);
                }
            })
            .await
    }
}
