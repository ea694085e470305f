//! Session config file command.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use rivulet_config::SessionConfig;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Validate a config file and print the resulting settings
    Check {
        /// Config file to check
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Write a config file holding the default values
    Init {
        /// Destination file
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Check { path } => {
            let config = SessionConfig::load(&path)?;
            let settings = config.to_settings()?;
            println!("{}: ok", path.display());
            println!();
            println!("  sample rate     {} Hz", settings.sample_rate);
            println!("  block size      {}", settings.block_size);
            println!(
                "  channels        {} in / {} out",
                settings.input_channels, settings.output_channels
            );
            println!("  max processors  {}", settings.max_processors);
            println!("  on cycle        {:?}", settings.schedule_policy);
            println!("  log filter      {}", config.logging.filter);
        }
        ConfigCommand::Init { path, force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            SessionConfig::default().save(&path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}
