//! HiveCore CLI: the main entry point.
//!
//! Commands:
//! - `serve`: Serve metrics over HTTP (and push to a collector)
//! - `pricing`: List model pricing
//! - `estimate`: Estimate the cost of a call
//! - `init-config`: Write a default config file
//! - `demo`: Run a synthetic workload and print its export

use clap::{Parser, Subcommand};
use hivecore_config::HubConfig;
use std::path::PathBuf;

mod commands;

use commands::demo::ExportFormat;

#[derive(Parser)]
#[command(
    name = "hivecore",
    about = "HiveCore: observability hub for multi-agent runtimes",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.hivecore/config.toml)
    #[arg(short, long, global = true, env = "HIVECORE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the metrics gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List model pricing (per 1K tokens)
    Pricing,

    /// Estimate the cost of one LLM call
    Estimate {
        #[arg(short, long)]
        model: String,

        /// Input (prompt) tokens
        #[arg(short, long)]
        input: u64,

        /// Output (completion) tokens
        #[arg(short, long)]
        output: u64,
    },

    /// Write a default config file to ~/.hivecore/config.toml
    InitConfig {
        /// Print to stdout instead of writing the file
        #[arg(long)]
        print: bool,
    },

    /// Run a synthetic two-agent workload and print the export
    Demo {
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Prometheus)]
        format: ExportFormat,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<HubConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => {
            let mut config = HubConfig::load_from(path)?;
            config.apply_env(|key| std::env::var(key).ok())?;
            config
        }
        None => HubConfig::load()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { config.log.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    if config.log.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Serve { port } => commands::serve::run(config, port).await?,
        Commands::Pricing => commands::pricing::list(&config)?,
        Commands::Estimate {
            model,
            input,
            output,
        } => commands::pricing::estimate(&config, &model, input, output)?,
        Commands::InitConfig { print } => commands::init_config::run(print)?,
        Commands::Demo { format } => commands::demo::run(format)?,
    }

    Ok(())
}
