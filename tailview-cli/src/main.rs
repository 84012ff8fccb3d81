//! Main entry point for the tailview CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use dotenv::dotenv;

mod commands;
mod logging;

use commands::{config::ConfigFormat, tail::TailArgs};

/// tailview CLI
#[derive(Parser)]
#[command(name = "tailview", version)]
#[command(about = "Follow a server-sent event stream like a live log console", long_about = None)]
pub(crate) struct Cli {
    /// Path to the configuration file (optional)
    #[arg(
        long,
        short,
        global = true,
        help = "Path to the configuration file (yaml, json or toml). Defaults to <config dir>/tailview/config.yaml when present."
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for the tailview CLI
#[derive(Subcommand)]
enum Commands {
    /// Follow the event stream and print events as they arrive
    Tail(TailArgs),

    /// List the dates the server offers for filtering
    Dates {
        /// Base URL of the event server
        #[arg(long, help = "Base URL of the event server (e.g., http://localhost:8080)")]
        server: Option<String>,
    },

    /// Generate a configuration file
    Config {
        /// Format of the configuration file to generate
        #[arg(long, short, value_enum, default_value_t = ConfigFormat::Yaml)]
        format: ConfigFormat,

        /// Directory to write the file into
        #[arg(long, help = "Directory to write the file into. Defaults to the current directory.")]
        output_dir: Option<PathBuf>,
    },

    /// Generate shell completion scripts for the CLI
    Completion {
        /// The shell type for which to generate the completion script
        #[arg(
            long,
            short,
            value_enum,
            help = "The shell type for which to generate the completion script (e.g., bash, zsh, fish, powershell)"
        )]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Tail(args) => {
            commands::tail::run(cli.config.as_deref(), args).await?;
        }
        Commands::Dates { server } => {
            commands::dates::list_dates(cli.config.as_deref(), server).await?;
        }
        Commands::Config { format, output_dir } => {
            commands::config::generate_config(format, output_dir.as_deref())?;
        }
        Commands::Completion { shell } => {
            commands::completion::generate_completion(shell);
        }
    }

    Ok(())
}
