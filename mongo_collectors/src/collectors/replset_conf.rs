use super::{decode, flag, replication_disabled, CollectorKind, SubCollector};
use async_trait::async_trait;
use mongo_core::bson::doc;
use mongo_core::{Result, Session};
use mongo_metrics::{Desc, FamilyGroup, GaugeFamily, LabelSet, ReconciledGaugeSet, Snapshot};
use serde::Deserialize;
use std::time::Duration;

const SUBSYSTEM: &str = "replset_conf";
const LABELS: &[&str] = &["id", "host"];

/// `replSetGetConfig` wraps the configuration in a `config` document.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplSetConfReply {
    pub config: ReplSetConf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReplSetConf {
    #[serde(rename = "_id")]
    pub id: String,
    pub version: f64,
    pub members: Vec<MemberConf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemberConf {
    pub host: String,
    pub arbiter_only: bool,
    pub build_indexes: bool,
    pub hidden: bool,
    pub priority: f64,
    pub votes: f64,
}

impl Default for MemberConf {
    fn default() -> Self {
        // Server-side defaults for omitted member fields.
        Self {
            host: String::new(),
            arbiter_only: false,
            build_indexes: true,
            hidden: false,
            priority: 1.0,
            votes: 1.0,
        }
    }
}

impl ReplSetConf {
    /// One label set per configured member; duplicates collapse downstream.
    pub fn label_sets(&self) -> Vec<LabelSet> {
        self.members
            .iter()
            .map(|member| {
                LabelSet::new([("id", self.id.as_str()), ("host", member.host.as_str())])
            })
            .collect()
    }
}

struct ReplSetConfFamilies {
    hidden: GaugeFamily,
    arbiter: GaugeFamily,
    build_indexes: GaugeFamily,
    priority: GaugeFamily,
    votes: GaugeFamily,
}

impl FamilyGroup for ReplSetConfFamilies {
    fn families(&self) -> Vec<&GaugeFamily> {
        vec![
            &self.hidden,
            &self.arbiter,
            &self.build_indexes,
            &self.priority,
            &self.votes,
        ]
    }
}

/// Member configuration gauges. Values survive between pulls; members
/// removed from the configuration are deleted on the next successful pull.
pub struct ReplSetConfCollector {
    gauges: ReconciledGaugeSet<ReplSetConfFamilies>,
}

impl ReplSetConfCollector {
    pub fn new() -> Result<Self> {
        let families = ReplSetConfFamilies {
            hidden: GaugeFamily::new(
                SUBSYSTEM,
                "member_hidden",
                "This field conveys if the member is hidden (1) or not-hidden (0).",
                LABELS,
            )?,
            arbiter: GaugeFamily::new(
                SUBSYSTEM,
                "member_arbiter",
                "This field conveys if the member is an arbiter (1) or not (0).",
                LABELS,
            )?,
            build_indexes: GaugeFamily::new(
                SUBSYSTEM,
                "member_build_indexes",
                "This field conveys if the member builds indexes (1) or not (0).",
                LABELS,
            )?,
            priority: GaugeFamily::new(
                SUBSYSTEM,
                "member_priority",
                "This field conveys the priority of a given member",
                LABELS,
            )?,
            votes: GaugeFamily::new(
                SUBSYSTEM,
                "member_votes",
                "This field conveys the number of votes of a given member",
                LABELS,
            )?,
        };
        Ok(Self {
            gauges: ReconciledGaugeSet::new(families),
        })
    }

    #[cfg(test)]
    pub(crate) async fn observed(&self) -> std::collections::HashSet<LabelSet> {
        self.gauges.observed().await
    }
}

#[async_trait]
impl SubCollector for ReplSetConfCollector {
    type Payload = ReplSetConf;

    fn kind(&self) -> CollectorKind {
        CollectorKind::ReplSetConf
    }

    fn describe(&self) -> Vec<Desc> {
        self.gauges.describe()
    }

    async fn fetch(&self, session: &dyn Session, timeout: Duration) -> Result<ReplSetConf> {
        let reply = session
            .run_command("admin", doc! { "replSetGetConfig": 1 }, timeout)
            .await
            .map_err(|e| replication_disabled(e, "replSetGetConfig"))?;
        let reply: ReplSetConfReply = decode(reply)?;
        Ok(reply.config)
    }

    async fn export(&self, conf: ReplSetConf) -> Snapshot {
        let current = conf.label_sets();
        self.gauges
            .publish(current, |g| {
                for member in &conf.members {
                    let labels = [conf.id.as_str(), member.host.as_str()];
                    g.hidden.set_values(&labels, flag(member.hidden));
                    g.arbiter.set_values(&labels, flag(member.arbiter_only));
                    g.build_indexes
                        .set_values(&labels, flag(member.build_indexes));
                    g.priority.set_values(&labels, member.priority);
                    g.votes.set_values(&labels, member.votes);
                }
            })
            .await
    }
}
