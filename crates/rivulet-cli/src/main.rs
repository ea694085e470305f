//! Rivulet CLI - command-line front end for the rivulet dataflow engine.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rivulet_config::SessionConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rivulet")]
#[command(author, version, about = "Rivulet dataflow engine CLI", long_about = None)]
struct Cli {
    /// Session config file (TOML)
    #[arg(long = "config", global = true, value_name = "FILE")]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered processor types and their parameters
    Types(commands::types::TypesArgs),

    /// Render a demo patch offline to a WAV file
    Render(commands::render::RenderArgs),

    /// Check or create session config files
    Config(commands::config::ConfigArgs),
}

/// Default log filter: `RUST_LOG` wins, then the config file, then `info`.
fn init_tracing(config: Option<&std::path::Path>) {
    let fallback = config
        .and_then(|path| SessionConfig::load(path).ok())
        .map_or_else(|| "info".to_string(), |c| c.logging.filter);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.config_file.as_deref());

    match cli.command {
        Commands::Types(args) => commands::types::run(args),
        Commands::Render(args) => commands::render::run(args, cli.config_file.as_deref()),
        Commands::Config(args) => commands::config::run(args),
    }
}
