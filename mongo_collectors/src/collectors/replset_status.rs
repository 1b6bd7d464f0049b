use super::{decode, millis_to_seconds, replication_disabled, CollectorKind, SubCollector};
use async_trait::async_trait;
use mongo_core::bson::{doc, DateTime};
use mongo_core::{Result, Session};
use mongo_metrics::{Desc, FamilyGroup, GaugeFamily, Snapshot, SnapshotGaugeSet};
use serde::Deserialize;
use std::time::Duration;

const SUBSYSTEM: &str = "replset";

/// Reply of `replSetGetStatus`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReplSetStatus {
    pub set: String,
    pub my_state: f64,
    pub term: Option<f64>,
    pub members: Vec<MemberStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemberStatus {
    pub name: String,
    pub health: f64,
    pub state: f64,
    pub uptime: f64,
    pub optime_date: Option<DateTime>,
    /// Absent for the member answering the command.
    pub ping_ms: Option<f64>,
}

struct ReplSetStatusFamilies {
    number_of_members: GaugeFamily,
    my_state: GaugeFamily,
    term: GaugeFamily,
    member_state: GaugeFamily,
    member_health: GaugeFamily,
    member_uptime: GaugeFamily,
    member_optime_date: GaugeFamily,
    member_ping: GaugeFamily,
}

impl ReplSetStatusFamilies {
    fn new() -> Result<Self> {
        Ok(Self {
            number_of_members: GaugeFamily::new(
                SUBSYSTEM,
                "number_of_members",
                "The number of replica set members.",
                &["set"],
            )?,
            my_state: GaugeFamily::new(
                SUBSYSTEM,
                "my_state",
                "An integer between 0 and 10 that represents the replica state of the current member.",
                &["set"],
            )?,
            term: GaugeFamily::new(
                SUBSYSTEM,
                "term",
                "The election count for the replica set, as known to this replica set member.",
                &["set"],
            )?,
            member_state: GaugeFamily::new(
                SUBSYSTEM,
                "member_state",
                "The value of state is an integer between 0 and 10 that represents the replica state of the member.",
                &["set", "name"],
            )?,
            member_health: GaugeFamily::new(
                SUBSYSTEM,
                "member_health",
                "This field conveys if the member is up (1) or down (0).",
                &["set", "name"],
            )?,
            member_uptime: GaugeFamily::new(
                SUBSYSTEM,
                "member_uptime",
                "The uptime field holds a value that reflects the number of seconds that this member has been online.",
                &["set", "name"],
            )?,
            member_optime_date: GaugeFamily::new(
                SUBSYSTEM,
                "member_optime_date",
                "The timestamp of the last oplog entry that this member applied, in seconds since the epoch.",
                &["set", "name"],
            )?,
            member_ping: GaugeFamily::new(
                SUBSYSTEM,
                "member_ping_seconds",
                "The round trip time, in seconds, from the remote member to the local instance.",
                &["set", "name"],
            )?,
        })
    }
}

impl FamilyGroup for ReplSetStatusFamilies {
    fn families(&self) -> Vec<&GaugeFamily> {
        vec![
            &self.number_of_members,
            &self.my_state,
            &self.term,
            &self.member_state,
            &self.member_health,
            &self.member_uptime,
            &self.member_optime_date,
            &self.member_ping,
        ]
    }
}

pub struct ReplSetStatusCollector {
    gauges: SnapshotGaugeSet<ReplSetStatusFamilies>,
}

impl ReplSetStatusCollector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            gauges: SnapshotGaugeSet::new(ReplSetStatusFamilies::new()?),
        })
    }
}

fn fill(g: &ReplSetStatusFamilies, status: &ReplSetStatus) {
    let set = status.set.as_str();
    g.number_of_members
        .set_values(&[set], status.members.len() as f64);
    g.my_state.set_values(&[set], status.my_state);
    if let Some(term) = status.term {
        g.term.set_values(&[set], term);
    }

    for member in &status.members {
        let labels = [set, member.name.as_str()];
        g.member_state.set_values(&labels, member.state);
        g.member_health.set_values(&labels, member.health);
        g.member_uptime.set_values(&labels, member.uptime);
        if let Some(optime) = member.optime_date {
            g.member_optime_date
                .set_values(&labels, optime.timestamp_millis() as f64 / 1e3);
        }
        if let Some(ping) = member.ping_ms {
            g.member_ping.set_values(&labels, millis_to_seconds(ping));
        }
    }
}

#[async_trait]
impl SubCollector for ReplSetStatusCollector {
    type Payload = ReplSetStatus;

    fn kind(&self) -> CollectorKind {
        CollectorKind::ReplSetStatus
    }

    fn describe(&self) -> Vec<Desc> {
        self.gauges.describe()
    }

    async fn fetch(&self, session: &dyn Session, timeout: Duration) -> Result<ReplSetStatus> {
        let reply = session
            .run_command("admin", doc! { "replSetGetStatus": 1 }, timeout)
            .await
            .map_err(|e| replication_disabled(e, "replSetGetStatus"))?;
        decode(reply)
    }

    async fn export(&self, payload: ReplSetStatus) -> Snapshot {
        self.gauges.publish(|g| fill(g, &payload)).await
    }
}
