use anyhow::Result;
use clap::{Parser, Subcommand};
use sitewright::config::DeploymentTarget;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "sitewright")]
#[command(version, about = "Site generation workflow orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Base URL of the generation backend
    #[arg(long, default_value = "http://localhost:8000", global = true)]
    pub api_url: String,

    /// Directory for session snapshots (defaults to the platform data dir)
    #[arg(long, global = true)]
    pub session_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configure the site to generate
    Configure {
        domain: String,

        #[arg(short, long, default_value = "stinson")]
        template: String,

        #[arg(long, default_value = "dental")]
        site_type: String,

        /// Scrape content from a different domain
        #[arg(long)]
        scrape_domain: Option<String>,

        /// Target the Cloudflare Pages demo deployment instead of production
        #[arg(long)]
        demo: bool,
    },
    /// Run a single step
    Run { step_id: String },
    /// Run the whole pipeline automatically
    Yolo {
        /// Pause after every successful step for review
        #[arg(short, long)]
        intervention: bool,

        /// Pause before editable steps to allow input replacement
        #[arg(short, long)]
        edit_inputs: bool,

        /// Keep going past hard failures
        #[arg(long)]
        no_stop_on_error: bool,

        /// Switch to the demo deployment target before running
        #[arg(long)]
        demo: bool,
    },
    /// Process a CSV roster of sites, one full run each
    Batch {
        roster: PathBuf,

        /// Switch to the demo deployment target before running
        #[arg(long)]
        demo: bool,
    },
    /// Show the step table and overall progress
    Status,
    /// Print a stored data key, or list available keys
    Data { key: Option<String> },
    /// Skip a pending or failed step
    Skip { step_id: String },
    /// Re-activate a skipped step
    Enable { step_id: String },
    /// Reset a finished or failed step back to pending
    Retry { step_id: String },
    /// Reset the whole workflow (keeps site configuration)
    Reset,
}

fn target_flag(demo: bool) -> Option<DeploymentTarget> {
    demo.then_some(DeploymentTarget::Demo)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "sitewright=debug" } else { "sitewright=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Configure {
            domain,
            template,
            site_type,
            scrape_domain,
            demo,
        } => {
            let target = if *demo {
                DeploymentTarget::Demo
            } else {
                DeploymentTarget::Production
            };
            cmd::cmd_configure(&cli, domain, template, site_type, scrape_domain.clone(), target)
                .await?;
        }
        Commands::Run { step_id } => cmd::cmd_run_step(&cli, step_id).await?,
        Commands::Yolo {
            intervention,
            edit_inputs,
            no_stop_on_error,
            demo,
        } => {
            cmd::cmd_yolo(
                &cli,
                *intervention,
                *edit_inputs,
                *no_stop_on_error,
                target_flag(*demo),
            )
            .await?;
        }
        Commands::Batch { roster, demo } => {
            cmd::cmd_batch(&cli, roster, target_flag(*demo)).await?;
        }
        Commands::Status => cmd::cmd_status(&cli).await?,
        Commands::Data { key } => cmd::cmd_data(&cli, key.as_deref()).await?,
        Commands::Skip { step_id } => cmd::cmd_skip(&cli, step_id).await?,
        Commands::Enable { step_id } => cmd::cmd_enable(&cli, step_id).await?,
        Commands::Retry { step_id } => cmd::cmd_retry(&cli, step_id).await?,
        Commands::Reset => cmd::cmd_reset(&cli).await?,
    }

    Ok(())
}
