use crate::family::{GaugeFamily, LabelSet};
use std::collections::HashSet;
use tracing::debug;

/// Remembers which label sets a dynamic-cardinality group exported last time,
/// and deletes the ones that disappeared.
#[derive(Debug, Default)]
pub struct MembershipReconciler {
    previous: HashSet<LabelSet>,
}

impl MembershipReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self) -> &HashSet<LabelSet> {
        &self.previous
    }

    /// `previous - current`, sorted for stable logging.
    pub fn stale(&self, current: &HashSet<LabelSet>) -> Vec<LabelSet> {
        let mut stale: Vec<LabelSet> = self.previous.difference(current).cloned().collect();
        stale.sort();
        stale
    }

    /// Deletes every stale label set from every family of the group, then
    /// makes `current` the new observation set. Returns what was removed.
    pub fn reconcile<I>(&mut self, current: I, families: &[&GaugeFamily]) -> Vec<LabelSet>
    where
        I: IntoIterator<Item = LabelSet>,
    {
        let current: HashSet<LabelSet> = current.into_iter().collect();
        let stale = self.stale(&current);

        for labels in &stale {
            for family in families {
                family.remove(labels);
            }
            debug!("Removed series {} no longer reported by the server", labels);
        }

        self.previous = current;
        stale
    }
}
