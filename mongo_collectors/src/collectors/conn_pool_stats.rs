use super::{decode, millis_to_seconds, CollectorKind, SubCollector};
use async_trait::async_trait;
use mongo_core::bson::doc;
use mongo_core::{Result, Session};
use mongo_metrics::{Desc, FamilyGroup, GaugeFamily, Snapshot, SnapshotGaugeSet};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

const SUBSYSTEM: &str = "connpoolstats";

/// Reply of `connPoolStats`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnPoolStats {
    pub num_client_connections: f64,
    #[serde(rename = "numAScopedConnections")]
    pub num_scoped_connections: f64,
    pub total_in_use: f64,
    pub total_available: f64,
    pub total_created: f64,
    pub total_refreshing: f64,
    pub replica_sets: BTreeMap<String, ReplicaSetStats>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReplicaSetStats {
    pub hosts: Vec<ReplicaSetHostStats>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReplicaSetHostStats {
    pub addr: String,
    pub ping_time_millis: f64,
}

struct ConnPoolFamilies {
    connections: GaugeFamily,
    client_connections: GaugeFamily,
    scoped_connections: GaugeFamily,
    ping_time: GaugeFamily,
}

impl FamilyGroup for ConnPoolFamilies {
    fn families(&self) -> Vec<&GaugeFamily> {
        vec![
            &self.connections,
            &self.client_connections,
            &self.scoped_connections,
            &self.ping_time,
        ]
    }
}

pub struct ConnPoolStatsCollector {
    gauges: SnapshotGaugeSet<ConnPoolFamilies>,
}

impl ConnPoolStatsCollector {
    pub fn new() -> Result<Self> {
        let families = ConnPoolFamilies {
            connections: GaugeFamily::new(
                SUBSYSTEM,
                "connections",
                "Outgoing connections held by this instance's connection pools, by state",
                &["state"],
            )?,
            client_connections: GaugeFamily::new(
                SUBSYSTEM,
                "client_connections",
                "Number of active and stored outgoing synchronous connections from this instance to other members",
                &[],
            )?,
            scoped_connections: GaugeFamily::new(
                SUBSYSTEM,
                "scoped_connections",
                "Number of active and stored outgoing scoped synchronous connections from this instance to other members",
                &[],
            )?,
            ping_time: GaugeFamily::new(
                SUBSYSTEM,
                "ping_time_seconds",
                "Corresponds to the ping time from this mongos to the corresponding host in seconds",
                &["host", "rs"],
            )?,
        };
        Ok(Self {
            gauges: SnapshotGaugeSet::new(families),
        })
    }
}

fn fill(g: &ConnPoolFamilies, stats: &ConnPoolStats) {
    g.connections.set_values(&["in_use"], stats.total_in_use);
    g.connections.set_values(&["available"], stats.total_available);
    g.connections.set_values(&["created"], stats.total_created);
    g.connections.set_values(&["refreshing"], stats.total_refreshing);
    g.client_connections
        .set_values(&[], stats.num_client_connections);
    g.scoped_connections
        .set_values(&[], stats.num_scoped_connections);

    for (replica_set, set_stats) in &stats.replica_sets {
        for host in &set_stats.hosts {
            g.ping_time.set_values(
                &[host.addr.as_str(), replica_set.as_str()],
                millis_to_seconds(host.ping_time_millis),
            );
        }
    }
}

#[async_trait]
impl SubCollector for ConnPoolStatsCollector {
    type Payload = ConnPoolStats;

    fn kind(&self) -> CollectorKind {
        CollectorKind::ConnPoolStats
    }

    fn describe(&self) -> Vec<Desc> {
        self.gauges.describe()
    }

    async fn fetch(&self, session: &dyn Session, timeout: Duration) -> Result<ConnPoolStats> {
        let reply = session
            .run_command("admin", doc! { "connPoolStats": 1 }, timeout)
            .await?;
        decode(reply)
    }

    async fn export(&self, payload: ConnPoolStats) -> Snapshot {
        self.gauges.publish(|g| fill(g, &payload)).await
    }
}
