use mongo_core::Result;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Prefix shared by every exported family.
pub const NAMESPACE: &str = "mongodb";

/// Dimension values identifying one series inside a family.
///
/// Names are kept sorted, so two label sets compare equal exactly when their
/// canonical renderings (`{host="a",id="rs0"}`) do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn new<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Values in the order of `names`; absent dimensions map to "".
    fn values_for<'a>(&'a self, names: &[&str]) -> Vec<&'a str> {
        names.iter().map(|name| self.get(name).unwrap_or("")).collect()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={:?}", name, value)?;
        }
        write!(f, "}}")
    }
}

/// A gauge family: one name, one help string, one value per label set.
///
/// Only reachable from the outside through a gauge set's lock scope.
#[derive(Clone)]
pub struct GaugeFamily {
    vec: GaugeVec,
    name: String,
    label_names: &'static [&'static str],
}

impl GaugeFamily {
    pub fn new(
        subsystem: &str,
        name: &str,
        help: &str,
        label_names: &'static [&'static str],
    ) -> Result<Self> {
        let opts = Opts::new(name, help)
            .namespace(NAMESPACE)
            .subsystem(subsystem);
        let name = opts.fq_name();
        let vec = GaugeVec::new(opts, label_names)?;
        Ok(Self {
            vec,
            name,
            label_names,
        })
    }

    /// Fully qualified name, e.g. `mongodb_collection_size_bytes`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label_names(&self) -> &'static [&'static str] {
        self.label_names
    }

    pub fn set(&self, labels: &LabelSet, value: f64) {
        self.set_values(&labels.values_for(self.label_names), value);
    }

    /// Upsert by positional label values, in `label_names()` order.
    pub fn set_values(&self, values: &[&str], value: f64) {
        match self.vec.get_metric_with_label_values(values) {
            Ok(gauge) => gauge.set(value),
            Err(e) => warn!("Dropping sample for {}: {}", self.name(), e),
        }
    }

    /// Deletes the series for `labels`; false if it was not held.
    pub fn remove(&self, labels: &LabelSet) -> bool {
        self.vec
            .remove_label_values(&labels.values_for(self.label_names))
            .is_ok()
    }

    /// Label sets currently holding a value.
    pub fn held_label_sets(&self) -> Vec<LabelSet> {
        self.collect()
            .iter()
            .flat_map(|mf| mf.get_metric())
            .map(|metric| {
                LabelSet::new(
                    metric
                        .get_label()
                        .iter()
                        .map(|pair| (pair.get_name(), pair.get_value())),
                )
            })
            .collect()
    }

    pub fn describe(&self) -> Vec<Desc> {
        self.vec.desc().into_iter().cloned().collect()
    }

    pub(crate) fn collect(&self) -> Vec<MetricFamily> {
        self.vec.collect()
    }

    pub(crate) fn reset(&self) {
        self.vec.reset();
    }
}

impl fmt::Debug for GaugeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GaugeFamily")
            .field("name", &self.name())
            .field("label_names", &self.label_names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family() -> GaugeFamily {
        GaugeFamily::new(
            "replset_conf",
            "member_votes",
            "Number of votes of a given member",
            &["id", "host"],
        )
        .unwrap()
    }

    #[test]
    fn test_label_set_identity_ignores_insertion_order() {
        let a = LabelSet::new([("id", "rs0"), ("host", "db-0:27017")]);
        let b = LabelSet::new([("host", "db-0:27017"), ("id", "rs0")]);

        assert_eq!(a, b);
        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.canonical(), r#"{host="db-0:27017",id="rs0"}"#);
    }

    #[test]
    fn test_family_name_is_namespaced() {
        assert_eq!(family().name(), "mongodb_replset_conf_member_votes");

        let bare = GaugeFamily::new("", "up", "liveness", &[]).unwrap();
        assert_eq!(bare.name(), "mongodb_up");
    }

    #[test]
    fn test_set_upserts_and_remove_deletes() {
        let family = family();
        let member = LabelSet::new([("id", "rs0"), ("host", "db-0:27017")]);

        family.set(&member, 1.0);
        family.set(&member, 2.0);
        assert_eq!(family.held_label_sets(), vec![member.clone()]);

        let value = family.collect()[0].get_metric()[0].get_gauge().get_value();
        assert_eq!(value, 2.0);

        assert!(family.remove(&member));
        assert!(!family.remove(&member));
        assert!(family.held_label_sets().is_empty());
    }

    #[test]
    fn test_wrong_arity_is_dropped_not_panicking() {
        let family = family();
        family.set_values(&["rs0"], 1.0);
        assert!(family.held_label_sets().is_empty());
    }

    #[test]
    fn test_invalid_family_name_is_rejected() {
        assert!(GaugeFamily::new("bad subsystem", "x", "help", &[]).is_err());
    }
}
