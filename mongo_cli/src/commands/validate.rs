use anyhow::Result;
use colored::Colorize;
use mongo_collectors::parse_config_from_file;
use mongo_core::mongo::redact_uri;
use std::path::PathBuf;

pub async fn execute(config_file: PathBuf) -> Result<()> {
    println!("{}", "=== Validating Config ===".bold().cyan());
    println!("File: {}", config_file.display());

    match parse_config_from_file(&config_file).await {
        Ok(config) => {
            println!("\n{}", "✓ Config is valid!".green().bold());
            println!("\nExporter Details:");
            println!("  URI: {}", redact_uri(&config.uri));
            println!("  Listen: {}{}", config.listen_address, config.telemetry_path);
            println!(
                "  Timeouts: connect {}, command {}",
                humantime::format_duration(config.connect_timeout),
                humantime::format_duration(config.command_timeout)
            );

            let kinds = config.collectors.kinds();
            if kinds.is_empty() {
                println!("\n{}", "⚠ Warning: no collector is enabled".yellow());
            }
            println!("\n  Collectors: {}", kinds.len());
            for kind in kinds {
                println!("    {} {}", "•".green(), kind);
            }

            if !config.parameters.is_empty() {
                println!("  Parameters: {}", config.parameters.join(", "));
            }

            Ok(())
        }
        Err(e) => {
            println!("\n{}", "✗ Config is invalid!".red().bold());
            println!("\nError: {}", e);
            Err(e.into())
        }
    }
}
