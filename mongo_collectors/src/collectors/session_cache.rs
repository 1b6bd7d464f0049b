use super::{decode_section, CollectorKind, SubCollector};
use async_trait::async_trait;
use mongo_core::bson::doc;
use mongo_core::source::with_max_time;
use mongo_core::{Result, Session};
use mongo_metrics::{Desc, FamilyGroup, GaugeFamily, Snapshot, SnapshotGaugeSet};
use serde::Deserialize;
use std::time::Duration;

/// The `logicalSessionRecordCache` section of `serverStatus`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionCacheStats {
    pub active_sessions_count: f64,
}

struct SessionCacheFamilies {
    active_sessions: GaugeFamily,
}

impl FamilyGroup for SessionCacheFamilies {
    fn families(&self) -> Vec<&GaugeFamily> {
        vec![&self.active_sessions]
    }
}

pub struct SessionCacheCollector {
    gauges: SnapshotGaugeSet<SessionCacheFamilies>,
}

impl SessionCacheCollector {
    pub fn new() -> Result<Self> {
        let families = SessionCacheFamilies {
            active_sessions: GaugeFamily::new(
                "",
                "active_sessions_count",
                "total number of active sessions in cache",
                &[],
            )?,
        };
        Ok(Self {
            gauges: SnapshotGaugeSet::new(families),
        })
    }
}

#[async_trait]
impl SubCollector for SessionCacheCollector {
    type Payload = SessionCacheStats;

    fn kind(&self) -> CollectorKind {
        CollectorKind::SessionCache
    }

    fn describe(&self) -> Vec<Desc> {
        self.gauges.describe()
    }

    async fn fetch(&self, session: &dyn Session, timeout: Duration) -> Result<SessionCacheStats> {
        let command = with_max_time(doc! { "serverStatus": 1 }, timeout);
        let reply = session.run_command("admin", command, timeout).await?;
        decode_section(&reply, "logicalSessionRecordCache")
    }

    async fn export(&self, payload: SessionCacheStats) -> Snapshot {
        self.gauges
            .publish(|g| g.active_sessions.set_values(&[], payload.active_sessions_count))
            .await
    }
}
