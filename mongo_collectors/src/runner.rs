use crate::collectors::{Collector, CollectorKind};
use crate::config::ExporterConfig;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use mongo_core::{DynDataSource, ExporterError, Result, Session};
use mongo_metrics::exporters::PrometheusExporter;
use mongo_metrics::{Desc, FamilyGroup, GaugeFamily, Snapshot, SnapshotGaugeSet};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

struct UpFamily {
    up: GaugeFamily,
}

impl FamilyGroup for UpFamily {
    fn families(&self) -> Vec<&GaugeFamily> {
        vec![&self.up]
    }
}

/// Runs one pull: acquire a session, run every enabled sub-collector in
/// order, close the session, merge what was exported.
pub struct ScrapeCoordinator {
    source: DynDataSource,
    collectors: Vec<Collector>,
    up: SnapshotGaugeSet<UpFamily>,
    command_timeout: Duration,
}

impl ScrapeCoordinator {
    pub fn new(
        source: DynDataSource,
        collectors: Vec<Collector>,
        command_timeout: Duration,
    ) -> Result<Self> {
        let up = UpFamily {
            up: GaugeFamily::new(
                "",
                "up",
                "To show if we can connect to mongodb instance",
                &[],
            )?,
        };
        Ok(Self {
            source,
            collectors,
            up: SnapshotGaugeSet::new(up),
            command_timeout,
        })
    }

    pub fn from_config(config: &ExporterConfig, source: DynDataSource) -> Result<Self> {
        Self::new(source, Collector::enabled(config)?, config.command_timeout)
    }

    pub fn enabled(&self) -> Vec<CollectorKind> {
        self.collectors.iter().map(Collector::kind).collect()
    }

    pub fn describe(&self) -> Vec<Desc> {
        let mut descs = self.up.describe();
        for collector in &self.collectors {
            descs.extend(collector.describe());
        }
        descs
    }

    pub async fn scrape(&self) -> ScrapeReport {
        let started_at = Utc::now();
        let start = Instant::now();

        let session = match self.source.acquire().await {
            Ok(session) => session,
            Err(e) => {
                error!("Cannot reach {}: {}", self.source.describe(), e);
                return ScrapeReport {
                    started_at,
                    up: false,
                    duration: start.elapsed(),
                    collectors: Vec::new(),
                    snapshot: self.publish_up(false).await,
                };
            }
        };

        let mut snapshot = self.publish_up(true).await;
        let mut runs = Vec::with_capacity(self.collectors.len());
        for collector in &self.collectors {
            let (run, exported) = self.run_collector(collector, session.as_ref()).await;
            if let Some(exported) = exported {
                snapshot.extend(exported);
            }
            runs.push(run);
        }
        session.close().await;

        let duration = start.elapsed();
        debug!(
            "Pull of {} finished in {:?} ({} series)",
            self.source.describe(),
            duration,
            snapshot.series_count()
        );

        ScrapeReport {
            started_at,
            up: true,
            duration,
            collectors: runs,
            snapshot,
        }
    }

    async fn publish_up(&self, up: bool) -> Snapshot {
        let value = if up { 1.0 } else { 0.0 };
        self.up.publish(|g| g.up.set_values(&[], value)).await
    }

    async fn run_collector(
        &self,
        collector: &Collector,
        session: &dyn Session,
    ) -> (CollectorRun, Option<Snapshot>) {
        let kind = collector.kind();
        let start = Instant::now();

        let result = AssertUnwindSafe(collector.scrape(session, self.command_timeout))
            .catch_unwind()
            .await;
        let duration = start.elapsed();

        let (outcome, exported) = match result {
            Ok(Ok(snapshot)) => {
                let series = snapshot.series_count();
                info!("Collected {} ({} series) in {:?}", kind, series, duration);
                (RunOutcome::Exported { series }, Some(snapshot))
            }
            Ok(Err(e)) => {
                log_failure(kind, &e);
                (
                    RunOutcome::Failed {
                        error: e.to_string(),
                    },
                    None,
                )
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Collector {} panicked: {}", kind, message);
                (RunOutcome::Panicked { message }, None)
            }
        };

        (
            CollectorRun {
                kind,
                duration,
                outcome,
            },
            exported,
        )
    }
}

fn log_failure(kind: CollectorKind, error: &ExporterError) {
    match error {
        ExporterError::MissingSection(section) => {
            debug!("Skipping {}: server reports no {}", kind, section)
        }
        _ => warn!("Collector {} failed: {}", kind, error),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Exported { series: usize },
    Failed { error: String },
    Panicked { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorRun {
    pub kind: CollectorKind,
    #[serde(with = "crate::config::humantime_serde")]
    pub duration: Duration,
    pub outcome: RunOutcome,
}

impl CollectorRun {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, RunOutcome::Exported { .. })
    }
}

/// Result of one pull: the merged snapshot plus what each collector did.
#[derive(Debug, Clone)]
pub struct ScrapeReport {
    pub started_at: DateTime<Utc>,
    pub up: bool,
    pub duration: Duration,
    pub collectors: Vec<CollectorRun>,
    pub snapshot: Snapshot,
}

impl ScrapeReport {
    /// Prometheus text exposition of the snapshot.
    pub fn to_text(&self) -> Result<String> {
        PrometheusExporter::format(self.snapshot.families())
    }

    pub fn failed(&self) -> impl Iterator<Item = &CollectorRun> {
        self.collectors.iter().filter(|run| !run.succeeded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSession;
    use async_trait::async_trait;
    use mockall::mock;
    use mongo_core::bson::{doc, Bson};
    use mongo_core::DataSource;
    use mongo_metrics::LabelSet;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    mock! {
        Source {}

        #[async_trait]
        impl DataSource for Source {
            async fn acquire(&self) -> Result<Box<dyn Session>>;
            fn describe(&self) -> String;
        }
    }

    /// A source handing out `sessions` in order, one per pull.
    fn source_of(sessions: Vec<ScriptedSession>) -> DynDataSource {
        let queue = Arc::new(Mutex::new(VecDeque::from(sessions)));
        let mut source = MockSource::new();
        source
            .expect_describe()
            .return_const("mongodb://test:27017".to_string());
        source.expect_acquire().returning(move || {
            let session = queue.lock().unwrap().pop_front().expect("no session left");
            Ok(Box::new(session) as Box<dyn Session>)
        });
        Arc::new(source)
    }

    fn coordinator(source: DynDataSource, kinds: Vec<CollectorKind>) -> ScrapeCoordinator {
        let config = ExporterConfig::builder().collectors(kinds).build();
        ScrapeCoordinator::from_config(&config, source).unwrap()
    }

    fn healthy() -> ScriptedSession {
        ScriptedSession::new()
            .reply("admin", "currentOp", doc! { "inprog": [], "ok": 1.0 })
            .reply(
                "admin",
                "serverStatus",
                doc! { "uptime": 10, "connections": { "current": 1, "available": 9 }, "ok": 1.0 },
            )
    }

    fn up_value(report: &ScrapeReport) -> Option<f64> {
        report.snapshot.value("mongodb_up", &LabelSet::empty())
    }

    #[tokio::test]
    async fn test_unreachable_source_reports_down() {
        let mut source = MockSource::new();
        source
            .expect_describe()
            .return_const("mongodb://gone:27017".to_string());
        source
            .expect_acquire()
            .returning(|| Err(ExporterError::Connection("refused".to_string())));
        let coordinator = coordinator(Arc::new(source), CollectorKind::defaults());

        let report = coordinator.scrape().await;

        assert!(!report.up);
        assert_eq!(up_value(&report), Some(0.0));
        assert!(report.collectors.is_empty());
        assert_eq!(report.snapshot.series_count(), 1);
    }

    #[tokio::test]
    async fn test_healthy_pull_reports_up_and_closes_once() {
        let session = healthy();
        let coordinator = coordinator(
            source_of(vec![session.clone()]),
            vec![CollectorKind::CurrentOp, CollectorKind::ServerStatus],
        );

        let report = coordinator.scrape().await;

        assert!(report.up);
        assert_eq!(up_value(&report), Some(1.0));
        assert_eq!(report.failed().count(), 0);
        assert_eq!(
            report
                .snapshot
                .value("mongodb_instance_uptime_seconds", &LabelSet::empty()),
            Some(10.0)
        );
        assert_eq!(session.close_count(), 1);
    }

    #[tokio::test]
    async fn test_collectors_run_in_fixed_order() {
        let session = healthy();
        let coordinator = coordinator(
            source_of(vec![session.clone()]),
            vec![CollectorKind::ServerStatus, CollectorKind::CurrentOp],
        );

        let report = coordinator.scrape().await;

        let kinds: Vec<CollectorKind> = report.collectors.iter().map(|run| run.kind).collect();
        assert_eq!(kinds, vec![CollectorKind::CurrentOp, CollectorKind::ServerStatus]);
        assert_eq!(
            session.calls(),
            vec!["admin.currentOp".to_string(), "admin.serverStatus".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_suppress_siblings() {
        let session = healthy().fail("admin", "replSetGetStatus", "not authorized on admin");
        let coordinator = coordinator(
            source_of(vec![session.clone()]),
            vec![
                CollectorKind::CurrentOp,
                CollectorKind::ReplSetStatus,
                CollectorKind::ServerStatus,
            ],
        );

        let report = coordinator.scrape().await;

        let failed: Vec<CollectorKind> = report.failed().map(|run| run.kind).collect();
        assert_eq!(failed, vec![CollectorKind::ReplSetStatus]);
        assert!(report
            .snapshot
            .value("mongodb_instance_uptime_seconds", &LabelSet::empty())
            .is_some());
        assert_eq!(session.close_count(), 1);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let session = healthy().panic_on("admin", "top");
        let coordinator = coordinator(
            source_of(vec![session.clone()]),
            vec![
                CollectorKind::CurrentOp,
                CollectorKind::TopStatus,
                CollectorKind::ServerStatus,
            ],
        );

        let report = coordinator.scrape().await;

        let top = report
            .collectors
            .iter()
            .find(|run| run.kind == CollectorKind::TopStatus)
            .unwrap();
        assert!(matches!(&top.outcome, RunOutcome::Panicked { message } if message.contains("admin.top")));
        let failed: Vec<CollectorKind> = report.failed().map(|run| run.kind).collect();
        assert_eq!(failed, vec![CollectorKind::TopStatus]);
        assert_eq!(report.collectors.len(), 3);
        assert!(report.up);
        assert_eq!(session.close_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_a_collector_failure() {
        let session = healthy().time_out("admin", "currentOp");
        let coordinator = coordinator(
            source_of(vec![session]),
            vec![CollectorKind::CurrentOp, CollectorKind::ServerStatus],
        );

        let report = coordinator.scrape().await;

        assert!(matches!(report.collectors[0].outcome, RunOutcome::Failed { .. }));
        assert!(report.collectors[1].succeeded());
        assert!(report.up);
    }

    #[tokio::test]
    async fn test_replset_members_follow_configuration() {
        let conf = |hosts: &[&str]| {
            let members: Vec<Bson> = hosts
                .iter()
                .map(|h| Bson::Document(doc! { "host": *h }))
                .collect();
            ScriptedSession::new().reply(
                "admin",
                "replSetGetConfig",
                doc! { "config": { "_id": "rs0", "members": members }, "ok": 1.0 },
            )
        };
        let failing =
            ScriptedSession::new().fail("admin", "replSetGetConfig", "connection reset");
        let coordinator = coordinator(
            source_of(vec![
                conf(&["a:27017", "b:27017", "c:27017"]),
                failing,
                conf(&["a:27017", "c:27017"]),
            ]),
            vec![CollectorKind::ReplSetConf],
        );
        let host = |h: &str| LabelSet::new([("id", "rs0"), ("host", h)]);

        let first = coordinator.scrape().await;
        assert_eq!(first.snapshot.label_sets("mongodb_replset_conf_member_votes").len(), 3);

        // A failed fetch leaves the previous members alone.
        let second = coordinator.scrape().await;
        assert!(second.snapshot.label_sets("mongodb_replset_conf_member_votes").is_empty());

        let third = coordinator.scrape().await;
        let mut members = third.snapshot.label_sets("mongodb_replset_conf_member_votes");
        members.sort();
        assert_eq!(members, vec![host("a:27017"), host("c:27017")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pulls_see_whole_groups() {
        let sessions: Vec<ScriptedSession> = (0..8).map(|_| healthy()).collect();
        let coordinator = Arc::new(coordinator(
            source_of(sessions),
            vec![CollectorKind::CurrentOp, CollectorKind::ServerStatus],
        ));

        let pulls: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move { coordinator.scrape().await })
            })
            .collect();

        for pull in pulls {
            let report = pull.await.unwrap();
            let connections = report.snapshot.label_sets("mongodb_connections");
            assert_eq!(connections.len(), 2);
            assert_eq!(up_value(&report), Some(1.0));
        }
    }

    #[tokio::test]
    async fn test_report_renders_text() {
        let coordinator = coordinator(
            source_of(vec![healthy()]),
            vec![CollectorKind::CurrentOp],
        );

        let text = coordinator.scrape().await.to_text().unwrap();

        assert!(text.contains("# TYPE mongodb_up gauge"));
        assert!(text.contains("mongodb_up 1"));
        assert!(text.contains("mongodb_instance_fsync_lock_worker 0"));
    }

    #[test]
    fn test_describe_includes_up() {
        let coordinator = coordinator(source_of(Vec::new()), CollectorKind::defaults());
        let names: Vec<String> = coordinator
            .describe()
            .into_iter()
            .map(|desc| desc.fq_name)
            .collect();

        assert!(names.contains(&"mongodb_up".to_string()));
        assert_eq!(coordinator.enabled(), CollectorKind::defaults());
    }

    #[test]
    fn test_run_duration_serializes_as_humantime() {
        let run = CollectorRun {
            kind: CollectorKind::TopStatus,
            duration: Duration::from_millis(1500),
            outcome: RunOutcome::Exported { series: 4 },
        };

        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["duration"], "1s 500ms");
        assert_eq!(json["kind"], "top_status");
        assert_eq!(json["outcome"]["status"], "exported");

        let back: CollectorRun = serde_json::from_value(json).unwrap();
        assert_eq!(back.duration, Duration::from_millis(1500));
    }
}
