use super::{build_coordinator, load_config};
use crate::ui;
use crate::{ConfigArgs, OutputFormat};
use anyhow::Result;
use mongo_collectors::{RunOutcome, ScrapeReport};
use mongo_metrics::exporters::JsonExporter;

pub async fn execute(args: ConfigArgs, format: OutputFormat) -> Result<()> {
    let config = load_config(args).await?;
    let coordinator = build_coordinator(&config)?;

    let report = coordinator.scrape().await;

    let output = match format {
        OutputFormat::Text => report.to_text()?,
        OutputFormat::Json => JsonExporter::to_string(&report.snapshot)?,
    };
    println!("{}", output);

    print_summary(&report, &config.session_options().redacted_uri());

    if !report.up {
        anyhow::bail!("MongoDB at {} is unreachable", config.session_options().redacted_uri());
    }
    Ok(())
}

/// Per-collector outcome, on stderr so stdout stays machine readable.
fn print_summary(report: &ScrapeReport, target: &str) {
    ui::eprint_header(&format!("Pull of {} at {}", target, report.started_at.to_rfc3339()));

    if !report.up {
        ui::eprint_error("mongodb_up 0: no session could be acquired");
        return;
    }

    for run in &report.collectors {
        let line = format!("{:<20} {:>8.1?}", run.kind.to_string(), run.duration);
        match &run.outcome {
            RunOutcome::Exported { series } => {
                ui::eprint_success(&format!("{} {} series", line, series))
            }
            RunOutcome::Failed { error } => ui::eprint_warning(&format!("{} {}", line, error)),
            RunOutcome::Panicked { message } => {
                ui::eprint_error(&format!("{} panicked: {}", line, message))
            }
        }
    }

    eprintln!(
        "\n{} series in {:?}",
        report.snapshot.series_count(),
        report.duration
    );
}
