use super::{decode_section, CollectorKind, SubCollector};
use async_trait::async_trait;
use mongo_core::bson::{doc, Timestamp};
use mongo_core::source::with_max_time;
use mongo_core::{Result, Session};
use mongo_metrics::{Desc, FamilyGroup, GaugeFamily, Snapshot, SnapshotGaugeSet};
use serde::Deserialize;
use std::time::Duration;

/// The `sharding` section of `serverStatus`, present on mongos and shard members.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Sharding {
    pub last_seen_config_server_op_time: Option<OpTime>,
    pub max_chunk_size_in_bytes: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpTime {
    pub ts: Option<Timestamp>,
    pub t: f64,
}

struct ShardingFamilies {
    optime_timestamp: GaugeFamily,
    optime_term: GaugeFamily,
    max_chunk_size: GaugeFamily,
}

impl FamilyGroup for ShardingFamilies {
    fn families(&self) -> Vec<&GaugeFamily> {
        vec![&self.optime_timestamp, &self.optime_term, &self.max_chunk_size]
    }
}

pub struct ShardingCollector {
    gauges: SnapshotGaugeSet<ShardingFamilies>,
}

impl ShardingCollector {
    pub fn new() -> Result<Self> {
        let families = ShardingFamilies {
            optime_timestamp: GaugeFamily::new(
                "sharding",
                "last_seen_configserver_optime_timestamp",
                "Last seen config server optime's timestamp, in seconds since the epoch",
                &[],
            )?,
            optime_term: GaugeFamily::new(
                "sharding",
                "last_seen_configserver_optime_term",
                "Last seen config server optime's term",
                &[],
            )?,
            max_chunk_size: GaugeFamily::new(
                "sharding",
                "max_chunk_size_bytes",
                "Maximum chunk size allowed in bytes",
                &[],
            )?,
        };
        Ok(Self {
            gauges: SnapshotGaugeSet::new(families),
        })
    }
}

#[async_trait]
impl SubCollector for ShardingCollector {
    type Payload = Sharding;

    fn kind(&self) -> CollectorKind {
        CollectorKind::Sharding
    }

    fn describe(&self) -> Vec<Desc> {
        self.gauges.describe()
    }

    async fn fetch(&self, session: &dyn Session, timeout: Duration) -> Result<Sharding> {
        let command = with_max_time(doc! { "serverStatus": 1 }, timeout);
        let reply = session.run_command("admin", command, timeout).await?;
        decode_section(&reply, "sharding")
    }

    async fn export(&self, payload: Sharding) -> Snapshot {
        self.gauges
            .publish(|g| {
                if let Some(optime) = &payload.last_seen_config_server_op_time {
                    if let Some(ts) = optime.ts {
                        g.optime_timestamp.set_values(&[], f64::from(ts.time));
                    }
                    g.optime_term.set_values(&[], optime.t);
                }
                g.max_chunk_size
                    .set_values(&[], payload.max_chunk_size_in_bytes);
            })
            .await
    }
}
