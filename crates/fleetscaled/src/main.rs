//! fleetscaled — the fleetscale daemon.
//!
//! Single binary that assembles the control loop:
//! - State store (redb)
//! - Policy registry and decision engine
//! - One controller and compute provider per fleet
//! - Autoscale ticker
//! - REST API + Prometheus metrics
//!
//! # Usage
//!
//! ```text
//! fleetscaled init --fleet eu-game > fleetscale.toml
//! fleetscaled serve --config fleetscale.toml
//! fleetscaled decide --policy aggressive --players 100 --capacity 10 --current 1
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod serve;

#[derive(Parser)]
#[command(name = "fleetscaled", about = "Autoscaling control loop for game-server fleets", version)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server and autoscale ticker.
    Serve {
        /// Path to fleetscale.toml.
        #[arg(short, long, default_value = "fleetscale.toml")]
        config: PathBuf,

        /// Override `server.port`.
        #[arg(long)]
        port: Option<u16>,

        /// Override `server.data_dir`.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Compute a scaling decision and print it. Touches no provider.
    Decide {
        #[arg(long, default_value = "cost-conscious")]
        policy: String,
        #[arg(long)]
        players: u64,
        #[arg(long)]
        capacity: u64,
        #[arg(long)]
        current: u32,
        #[arg(long, default_value = "0")]
        queue: u64,
        #[arg(long, default_value = "0")]
        daily_cost: f64,
        /// Budget for cost-capped; overrides the config's cap.
        #[arg(long)]
        daily_budget: Option<f64>,
        /// Read the policy setup from this config instead of the defaults.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print a starter fleetscale.toml.
    Init {
        #[arg(long, default_value = "game-fleet")]
        fleet: String,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,fleetscale=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Serve {
            config,
            port,
            data_dir,
        } => serve::run(&config, port, data_dir).await,
        Command::Decide {
            policy,
            players,
            capacity,
            current,
            queue,
            daily_cost,
            daily_budget,
            config,
        } => {
            let metrics = fleetscale_core::MetricsSnapshot {
                current_players: players,
                server_capacity: capacity,
                current_servers: current,
                queue_length: queue,
                daily_cost,
                daily_budget,
            };
            commands::decide(&policy, &metrics, config.as_deref())
        }
        Command::Init { fleet } => commands::init(&fleet),
    }
}
