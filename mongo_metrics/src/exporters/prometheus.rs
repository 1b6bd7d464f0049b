use mongo_core::{ExporterError, Result};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};

pub struct PrometheusExporter;

impl PrometheusExporter {
    pub fn content_type() -> &'static str {
        prometheus::TEXT_FORMAT
    }

    /// Text exposition of `families`. Families without series are skipped,
    /// the encoder refuses them.
    pub fn format(families: &[MetricFamily]) -> Result<String> {
        let families: Vec<MetricFamily> = families
            .iter()
            .filter(|mf| !mf.get_metric().is_empty())
            .cloned()
            .collect();

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| ExporterError::Other(e.into()))
    }
}
