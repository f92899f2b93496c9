use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use issueforge::config::CliOverrides;

mod cmd;

#[derive(Parser)]
#[command(name = "issueforge")]
#[command(version, about = "Turn project plans into GitHub issues with AI prompts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Port to serve on (overrides config and ISSUEFORGE_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to bind (overrides config and ISSUEFORGE_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Enable dev mode (CORS permissive for a separately served frontend)
        #[arg(long)]
        dev: bool,

        /// Open the browser once the server is listening
        #[arg(long)]
        open: bool,

        /// Path to issueforge.toml
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Extract tasks from a plan file, optionally aligning a prompts file
    Extract {
        /// Plan text (markdown or plain text)
        plan_file: PathBuf,

        /// Prompt document to align against the extracted tasks
        #[arg(long)]
        prompts: Option<PathBuf>,

        /// Print JSON instead of a formatted listing
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve {
            port,
            host,
            dev,
            open,
            config,
        } => {
            let overrides = CliOverrides {
                port: *port,
                host: host.clone(),
                dev_mode: *dev,
            };
            cmd::cmd_serve(config.as_deref(), overrides, *open).await?;
        }
        Commands::Extract {
            plan_file,
            prompts,
            json,
        } => cmd::cmd_extract(plan_file, prompts.as_deref(), *json)?,
    }

    Ok(())
}
