use super::{decode, flag, CollectorKind, SubCollector};
use async_trait::async_trait;
use mongo_core::bson::doc;
use mongo_core::{Result, Session};
use mongo_metrics::{Desc, FamilyGroup, GaugeFamily, LabelSet, Snapshot, SnapshotGaugeSet};
use serde::Deserialize;
use std::time::Duration;

/// Top-level fields of the `currentOp` reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentOp {
    /// Only present while an `fsyncLock` is held.
    #[serde(rename = "fsyncLock", default)]
    pub fsync_lock: bool,
}

struct CurrentOpFamilies {
    fsync_lock_worker: GaugeFamily,
}

impl FamilyGroup for CurrentOpFamilies {
    fn families(&self) -> Vec<&GaugeFamily> {
        vec![&self.fsync_lock_worker]
    }
}

pub struct CurrentOpCollector {
    gauges: SnapshotGaugeSet<CurrentOpFamilies>,
}

impl CurrentOpCollector {
    pub fn new() -> Result<Self> {
        let families = CurrentOpFamilies {
            fsync_lock_worker: GaugeFamily::new(
                "instance",
                "fsync_lock_worker",
                "Whether the fsyncLock worker is active (1) or not (0).",
                &[],
            )?,
        };
        Ok(Self {
            gauges: SnapshotGaugeSet::new(families),
        })
    }
}

#[async_trait]
impl SubCollector for CurrentOpCollector {
    type Payload = CurrentOp;

    fn kind(&self) -> CollectorKind {
        CollectorKind::CurrentOp
    }

    fn describe(&self) -> Vec<Desc> {
        self.gauges.describe()
    }

    async fn fetch(&self, session: &dyn Session, timeout: Duration) -> Result<CurrentOp> {
        // The filter matches no operation: only the top-level lock flag is wanted.
        let command = doc! { "currentOp": 1, "notexist": 0 };
        let reply = session.run_command("admin", command, timeout).await?;
        decode(reply)
    }

    async fn export(&self, payload: CurrentOp) -> Snapshot {
        self.gauges
            .publish(|g| {
                g.fsync_lock_worker
                    .set(&LabelSet::empty(), flag(payload.fsync_lock));
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSession;

    #[tokio::test]
    async fn test_fsync_lock_flag() {
        let session = ScriptedSession::new().reply(
            "admin",
            "currentOp",
            doc! { "inprog": [], "fsyncLock": true, "ok": 1.0 },
        );
        let collector = CurrentOpCollector::new().unwrap();

        let snapshot = collector
            .scrape(&session, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(
            snapshot.value("mongodb_instance_fsync_lock_worker", &LabelSet::empty()),
            Some(1.0)
        );
    }

    #[tokio::test]
    async fn test_absent_flag_means_unlocked() {
        let session =
            ScriptedSession::new().reply("admin", "currentOp", doc! { "inprog": [], "ok": 1.0 });
        let collector = CurrentOpCollector::new().unwrap();

        let snapshot = collector
            .scrape(&session, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(
            snapshot.value("mongodb_instance_fsync_lock_worker", &LabelSet::empty()),
            Some(0.0)
        );
    }
}
