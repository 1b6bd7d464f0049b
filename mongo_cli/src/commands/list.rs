use anyhow::Result;
use colored::Colorize;
use mongo_collectors::{Collector, CollectorKind, ExporterConfig};

pub async fn execute() -> Result<()> {
    println!("{}", "=== Available Collectors ===".bold().cyan());

    let config = ExporterConfig::builder()
        .collectors(CollectorKind::ALL.to_vec())
        .build();
    let collectors = Collector::enabled(&config)?;

    println!("\nTotal collectors: {}\n", collectors.len());

    for collector in collectors {
        let kind = collector.kind();
        let default = if kind.enabled_by_default() {
            "on by default".green()
        } else {
            "off by default".yellow()
        };
        println!("  {} {} ({})", "•".green(), kind.to_string().bold(), default);

        for desc in collector.describe() {
            if desc.variable_labels.is_empty() {
                println!("      {}", desc.fq_name);
            } else {
                println!("      {}{{{}}}", desc.fq_name, desc.variable_labels.join(","));
            }
        }
    }

    println!(
        "\n{}",
        "Use '--collect <kind>' or the config file to enable a collector".yellow()
    );

    Ok(())
}
