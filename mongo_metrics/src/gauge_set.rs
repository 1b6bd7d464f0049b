use crate::family::{GaugeFamily, LabelSet};
use crate::reconciler::MembershipReconciler;
use prometheus::core::Desc;
use prometheus::proto::MetricFamily;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::Mutex;

/// The families making up one sub-collector's output.
pub trait FamilyGroup: Send {
    fn families(&self) -> Vec<&GaugeFamily>;
}

/// One exported series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub name: String,
    pub labels: LabelSet,
    pub value: f64,
}

/// Everything one gauge set published during one pull.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    families: Vec<MetricFamily>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_group<G: FamilyGroup + ?Sized>(group: &G) -> Self {
        let families = group
            .families()
            .iter()
            .flat_map(|family| family.collect())
            .filter(|mf| !mf.get_metric().is_empty())
            .collect();
        Self { families }
    }

    pub fn families(&self) -> &[MetricFamily] {
        &self.families
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Number of series across all families.
    pub fn series_count(&self) -> usize {
        self.families.iter().map(|mf| mf.get_metric().len()).sum()
    }

    pub fn extend(&mut self, other: Snapshot) {
        self.families.extend(other.families);
    }

    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        self.families.iter().flat_map(|mf| {
            mf.get_metric().iter().map(move |metric| Sample {
                name: mf.get_name().to_string(),
                labels: LabelSet::new(
                    metric
                        .get_label()
                        .iter()
                        .map(|pair| (pair.get_name(), pair.get_value())),
                ),
                value: metric.get_gauge().get_value(),
            })
        })
    }

    /// Value of the series `name{labels}`, if exported.
    pub fn value(&self, name: &str, labels: &LabelSet) -> Option<f64> {
        self.samples()
            .find(|sample| sample.name == name && &sample.labels == labels)
            .map(|sample| sample.value)
    }

    /// Label sets exported for family `name`.
    pub fn label_sets(&self, name: &str) -> Vec<LabelSet> {
        self.samples()
            .filter(|sample| sample.name == name)
            .map(|sample| sample.labels)
            .collect()
    }
}

impl IntoIterator for Snapshot {
    type Item = MetricFamily;
    type IntoIter = std::vec::IntoIter<MetricFamily>;

    fn into_iter(self) -> Self::IntoIter {
        self.families.into_iter()
    }
}

/// Families that are rebuilt from scratch on every pull.
///
/// `publish` holds the set's lock across fill, export and reset, so two
/// concurrent pulls never see each other's values.
pub struct SnapshotGaugeSet<G> {
    group: Mutex<G>,
    descs: Vec<Desc>,
}

impl<G: FamilyGroup> SnapshotGaugeSet<G> {
    pub fn new(group: G) -> Self {
        let descs = describe_group(&group);
        Self {
            group: Mutex::new(group),
            descs,
        }
    }

    pub async fn publish<F>(&self, fill: F) -> Snapshot
    where
        F: FnOnce(&G),
    {
        let group = self.group.lock().await;
        // Values left behind by a fill that panicked mid-way.
        reset_group(&*group);
        fill(&*group);
        export_and_reset_group(&*group)
    }

    pub async fn export_and_reset(&self) -> Snapshot {
        let group = self.group.lock().await;
        export_and_reset_group(&*group)
    }

    pub fn describe(&self) -> Vec<Desc> {
        self.descs.clone()
    }
}

/// Families whose label sets follow a changing membership (replica-set
/// members). Values persist across pulls; members that vanish are deleted.
pub struct ReconciledGaugeSet<G> {
    state: Mutex<ReconciledState<G>>,
    descs: Vec<Desc>,
}

struct ReconciledState<G> {
    group: G,
    reconciler: MembershipReconciler,
}

impl<G: FamilyGroup> ReconciledGaugeSet<G> {
    pub fn new(group: G) -> Self {
        let descs = describe_group(&group);
        Self {
            state: Mutex::new(ReconciledState {
                group,
                reconciler: MembershipReconciler::new(),
            }),
            descs,
        }
    }

    /// `current` must list every label set `fill` is about to populate.
    pub async fn publish<F>(&self, current: Vec<LabelSet>, fill: F) -> Snapshot
    where
        F: FnOnce(&G),
    {
        let mut guard = self.state.lock().await;
        let ReconciledState { group, reconciler } = &mut *guard;

        fill(&*group);
        reconciler.reconcile(current, &group.families());
        Snapshot::from_group(&*group)
    }

    pub async fn observed(&self) -> HashSet<LabelSet> {
        self.state.lock().await.reconciler.previous().clone()
    }

    pub fn describe(&self) -> Vec<Desc> {
        self.descs.clone()
    }
}

fn describe_group<G: FamilyGroup>(group: &G) -> Vec<Desc> {
    group
        .families()
        .iter()
        .flat_map(|family| family.describe())
        .collect()
}

fn reset_group<G: FamilyGroup + ?Sized>(group: &G) {
    for family in group.families() {
        family.reset();
    }
}

fn export_and_reset_group<G: FamilyGroup + ?Sized>(group: &G) -> Snapshot {
    let snapshot = Snapshot::from_group(group);
    reset_group(group);
    snapshot
}
