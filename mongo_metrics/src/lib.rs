pub mod aggregator;
pub mod exporters;
pub mod family;
pub mod gauge_set;
pub mod reconciler;

pub use aggregator::{CategoryAggregator, CategoryTotals, OpCategory, OpStat};
pub use family::{GaugeFamily, LabelSet, NAMESPACE};
pub use gauge_set::{FamilyGroup, ReconciledGaugeSet, Sample, Snapshot, SnapshotGaugeSet};
pub use reconciler::MembershipReconciler;

pub use prometheus::core::Desc;
pub use prometheus::proto::MetricFamily;
