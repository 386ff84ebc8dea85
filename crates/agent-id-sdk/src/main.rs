/*!
 * agent-id CLI
 *
 * Operates an agent's credential bundle from the command line:
 * 1. Inspect the bundle and the backend's view of the key
 * 2. Rotate the key, or reconcile after an interrupted rotation
 * 3. Run the rotation monitor in the foreground
 * 4. Sign and submit a test action
 *
 * Usage:
 *   agent-id show
 *   agent-id status
 *   agent-id rotate
 *   agent-id watch --interval 60
 *   agent-id verify --action read --resource reports/q3
 */

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "agent-id")]
#[command(about = "Credential and key rotation tool for agent-id agents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Credential bundle file
    #[arg(short, long, env = "AGENT_ID_BUNDLE", default_value = "./agent-credentials.json")]
    bundle: PathBuf,

    /// Server URL; defaults to the bundle's backend URL
    #[arg(short, long, env = "AGENT_ID_SERVER")]
    server: Option<String>,

    /// SDK access token
    #[arg(long, env = "AGENT_ID_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// SDK refresh token
    #[arg(long, env = "AGENT_ID_REFRESH_TOKEN", hide_env_values = true)]
    refresh_token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the stored credential bundle
    Show,
    /// Show the backend's key status
    Status,
    /// Rotate the key now
    Rotate,
    /// Resolve local key state against the backend after an interruption
    Reconcile,
    /// Run the rotation monitor until interrupted
    Watch {
        /// Seconds between key status checks
        #[arg(short, long, default_value_t = 3600)]
        interval: u64,
    },
    /// Sign and submit an action for verification
    Verify {
        #[arg(short, long)]
        action: String,

        #[arg(short, long)]
        resource: String,

        /// low, medium, high or critical
        #[arg(long, default_value = "low")]
        risk: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_id_sdk=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let ctx = commands::Context {
        bundle_path: cli.bundle,
        server: cli.server,
        access_token: cli.access_token,
        refresh_token: cli.refresh_token,
    };

    match cli.command {
        Commands::Show => commands::keys::show(&ctx)?,
        Commands::Status => commands::keys::status(&ctx).await?,
        Commands::Rotate => commands::keys::rotate(&ctx).await?,
        Commands::Reconcile => commands::keys::reconcile(&ctx).await?,
        Commands::Watch { interval } => commands::keys::watch(&ctx, interval).await?,
        Commands::Verify {
            action,
            resource,
            risk,
        } => commands::actions::verify(&ctx, &action, &resource, &risk).await?,
    }

    Ok(())
}
