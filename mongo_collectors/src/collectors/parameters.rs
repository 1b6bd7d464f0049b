use super::{CollectorKind, SubCollector};
use async_trait::async_trait;
use mongo_core::bson::{doc, Document};
use mongo_core::source::bson_number;
use mongo_core::{ExporterError, Result, Session};
use mongo_metrics::{Desc, FamilyGroup, GaugeFamily, Snapshot, SnapshotGaugeSet};
use std::time::Duration;
use tracing::warn;

/// Server parameters that can be exported: `(getParameter name, gauge name, help)`.
pub const KNOWN_PARAMETERS: [(&str, &str, &str); 3] = [
    (
        "cursorTimeoutMillis",
        "cursor_timeout_millis",
        "An integer that represents the cursorTimeoutMillis option in mongod",
    ),
    (
        "transactionLifetimeLimitSeconds",
        "transaction_lifetime_limit_seconds",
        "Lifetime of multi-document transactions before they are aborted, in seconds",
    ),
    (
        "maxTransactionLockRequestTimeoutMillis",
        "max_transaction_lock_request_timeout_millis",
        "Time transactions wait to acquire locks before aborting, in milliseconds",
    ),
];

pub fn is_known_parameter(name: &str) -> bool {
    KNOWN_PARAMETERS.iter().any(|(known, _, _)| *known == name)
}

/// Values read this pull, by parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterValues(pub Vec<(String, f64)>);

struct ParameterFamilies {
    /// Parallel to `KNOWN_PARAMETERS`.
    gauges: Vec<GaugeFamily>,
}

impl FamilyGroup for ParameterFamilies {
    fn families(&self) -> Vec<&GaugeFamily> {
        self.gauges.iter().collect()
    }
}

pub struct ParametersCollector {
    wanted: Vec<String>,
    gauges: SnapshotGaugeSet<ParameterFamilies>,
}

impl ParametersCollector {
    pub fn new(wanted: &[String]) -> Result<Self> {
        let gauges = KNOWN_PARAMETERS
            .iter()
            .map(|(_, name, help)| GaugeFamily::new("parameters", name, help, &[]))
            .collect::<Result<Vec<_>>>()?;
        let wanted = wanted
            .iter()
            .filter(|name| {
                let known = is_known_parameter(name);
                if !known {
                    warn!("Ignoring unknown server parameter '{}'", name);
                }
                known
            })
            .cloned()
            .collect();
        Ok(Self {
            wanted,
            gauges: SnapshotGaugeSet::new(ParameterFamilies { gauges }),
        })
    }
}

fn parameter_value(reply: &Document, name: &str) -> Result<f64> {
    reply
        .get(name)
        .and_then(bson_number)
        .ok_or_else(|| ExporterError::Decode(format!("getParameter reply has no numeric '{}'", name)))
}

#[async_trait]
impl SubCollector for ParametersCollector {
    type Payload = ParameterValues;

    fn kind(&self) -> CollectorKind {
        CollectorKind::Parameters
    }

    fn describe(&self) -> Vec<Desc> {
        self.gauges.describe()
    }

    /// One `getParameter` per name. Fails only when every lookup failed.
    async fn fetch(&self, session: &dyn Session, timeout: Duration) -> Result<ParameterValues> {
        let mut values = Vec::new();
        let mut last_error = None;

        for name in &self.wanted {
            let mut command = doc! { "getParameter": 1 };
            command.insert(name.as_str(), 1);
            let value = match session.run_command("admin", command, timeout).await {
                Ok(reply) => parameter_value(&reply, name),
                Err(e) => Err(e),
            };
            match value {
                Ok(value) => values.push((name.clone(), value)),
                Err(e) => {
                    warn!("Failed to read server parameter {}: {}", name, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if values.is_empty() => Err(e),
            _ => Ok(ParameterValues(values)),
        }
    }

    async fn export(&self, payload: ParameterValues) -> Snapshot {
        self.gauges
            .publish(|g| {
                for (name, value) in &payload.0 {
                    let slot = KNOWN_PARAMETERS
                        .iter()
                        .position(|(known, _, _)| *known == name.as_str());
                    if let Some(family) = slot.and_then(|i| g.gauges.get(i)) {
                        family.set_values(&[], *value);
                    }
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

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_cursor_timeout() {
        let session = ScriptedSession::new().reply(
            "admin",
            "getParameter",
            doc! { "cursorTimeoutMillis": 600_000_i64, "ok": 1.0 },
        );
        let collector = ParametersCollector::new(&names(&["cursorTimeoutMillis"])).unwrap();

        let snapshot = collector
            .scrape(&session, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(
            snapshot.value("mongodb_parameters_cursor_timeout_millis", &LabelSet::empty()),
            Some(600_000.0)
        );
        assert_eq!(snapshot.series_count(), 1);
    }

    #[tokio::test]
    async fn test_partial_success_is_kept() {
        // Only the first parameter is in the reply.
        let session = ScriptedSession::new().reply(
            "admin",
            "getParameter",
            doc! { "cursorTimeoutMillis": 1000, "ok": 1.0 },
        );
        let collector = ParametersCollector::new(&names(&[
            "cursorTimeoutMillis",
            "transactionLifetimeLimitSeconds",
        ]))
        .unwrap();

        let values = collector.fetch(&session, Duration::from_secs(1)).await.unwrap();
        assert_eq!(values, ParameterValues(vec![("cursorTimeoutMillis".to_string(), 1000.0)]));
    }

    #[tokio::test]
    async fn test_all_lookups_failing_is_an_error() {
        let session = ScriptedSession::new().fail("admin", "getParameter", "unauthorized");
        let collector = ParametersCollector::new(&names(&["cursorTimeoutMillis"])).unwrap();

        assert!(collector.scrape(&session, Duration::from_secs(1)).await.is_err());
    }

    #[test]
    fn test_unknown_names_are_dropped() {
        let collector = ParametersCollector::new(&names(&["bogus", "cursorTimeoutMillis"])).unwrap();
        assert_eq!(collector.wanted, names(&["cursorTimeoutMillis"]));
        assert!(is_known_parameter("maxTransactionLockRequestTimeoutMillis"));
    }
}
