mod commands;
mod ui;

use clap::{Args, Parser, Subcommand, ValueEnum};
use mongo_collectors::CollectorKind;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

#[derive(Parser)]
#[command(name = "mongodb_exporter")]
#[command(about = "Prometheus exporter for MongoDB server diagnostics", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

/// Overrides applied on top of the config file.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Config file (YAML, TOML, or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI")]
    pub uri: Option<String>,

    /// Enable a collector (repeatable)
    #[arg(long = "collect", value_name = "KIND")]
    pub collect: Vec<CollectorKind>,

    /// Disable a collector (repeatable)
    #[arg(long = "no-collect", value_name = "KIND")]
    pub no_collect: Vec<CollectorKind>,

    /// Deadline for each diagnostic command, e.g. "5s"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub command_timeout: Option<Duration>,

    /// Deadline for connecting, e.g. "10s"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub connect_timeout: Option<Duration>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve metrics over HTTP
    Serve {
        #[command(flatten)]
        config: ConfigArgs,

        /// Address to listen on
        #[arg(short, long)]
        listen: Option<String>,

        /// Path under which to expose metrics
        #[arg(long)]
        path: Option<String>,
    },

    /// Run one pull and print the result
    Scrape {
        #[command(flatten)]
        config: ConfigArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Validate a config file
    Validate {
        /// Path to config file
        config_file: PathBuf,
    },

    /// List collectors and the families they export
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Serve {
            config,
            listen,
            path,
        } => {
            commands::serve::execute(config, listen, path).await?;
        }

        Commands::Scrape { config, format } => {
            commands::scrape::execute(config, format).await?;
        }

        Commands::Validate { config_file } => {
            commands::validate::execute(config_file).await?;
        }

        Commands::List => {
            commands::list::execute().await?;
        }
    }

    Ok(())
}
