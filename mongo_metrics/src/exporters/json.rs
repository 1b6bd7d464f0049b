use crate::gauge_set::{Sample, Snapshot};
use anyhow::Result;

pub struct JsonExporter;

impl JsonExporter {
    pub fn to_string(snapshot: &Snapshot) -> Result<String> {
        let samples: Vec<Sample> = snapshot.samples().collect();
        Ok(serde_json::to_string_pretty(&samples)?)
    }
}
