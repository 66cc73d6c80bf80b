//! Command line client for the encrypted counter.
//!
//! Configuration comes from the environment (see `Config::from_env`), so a
//! `.env` next to the binary is enough to point it at a network.
//!
//! Usage examples:
//! ```shell
//! # Resolve the deployment, build the FHEVM instance and show the handle
//! fhe-counter status
//!
//! # Decrypt the current count (prompts for a signature once per year)
//! fhe-counter decrypt
//!
//! # Add 5 / subtract 2
//! fhe-counter increment --by 5
//! fhe-counter decrement --by 2
//!
//! # Follow chain, instance and counter changes
//! fhe-counter watch
//! ```

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use eyre::{bail, Result};
use fhe_counter_client::{Config, CounterApp, CounterView, OperationOutcome};
use fhe_counter_lib::chains::network_label;
use std::fmt::Display;
use std::str::FromStr;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fhe-counter")]
#[command(about = "Client for the FHECounter confidential counter")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print the counter view as JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show deployment, instance status and the current handle
    Status,
    /// Re-read the encrypted handle
    Refresh,
    /// Decrypt the current handle
    Decrypt,
    /// Add to the counter
    Increment {
        #[arg(long, default_value_t = 1)]
        by: u32,
    },
    /// Subtract from the counter
    Decrement {
        #[arg(long, default_value_t = 1)]
        by: u32,
    },
    /// Keep running and print every state change
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let cli = Cli::parse();

    let log_level = LevelFilter::from_str(&cli.log_level).unwrap_or(LevelFilter::INFO);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(
        "Using {} (chain {}) via {}",
        config.network.name, config.network.chain_id, config.network.rpc_url
    );

    let app = CounterApp::from_config(&config).await?;

    if let Commands::Watch = cli.command {
        return watch(&app, cli.json).await;
    }

    app.sync().await;
    let controller = &app.controller;

    match cli.command {
        Commands::Status | Commands::Watch => {}
        Commands::Refresh => report("refresh", controller.refresh().await)?,
        Commands::Decrypt => report("decrypt", controller.decrypt_count_handle().await)?,
        Commands::Increment { by } => {
            report("increment", controller.inc_or_dec(i64::from(by)).await)?;
        }
        Commands::Decrement { by } => {
            report("decrement", controller.inc_or_dec(-i64::from(by)).await)?;
        }
    }

    print_view(&controller.view(), cli.json)?;
    Ok(())
}

fn report<T: Display>(operation: &str, outcome: OperationOutcome<T>) -> Result<()> {
    match outcome {
        OperationOutcome::Applied(value) => {
            info!("✅ {} completed: {}", operation, value);
            Ok(())
        }
        OperationOutcome::Rejected(reason) => {
            error!("❌ {} not possible: {}", operation, reason);
            bail!("{operation} rejected: {reason}")
        }
        OperationOutcome::Discarded => {
            warn!("⚠️ {} result discarded; chain or account changed", operation);
            Ok(())
        }
        OperationOutcome::Failed(e) => {
            error!("❌ {} failed: {}", operation, e);
            Err(e.into())
        }
    }
}

fn print_view(view: &CounterView, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(view)?);
        return Ok(());
    }

    println!("Network:    {}", network_label(view.chain_id));
    match (view.is_deployed, view.contract_address) {
        (Some(true), Some(address)) => println!("Contract:   {address}"),
        (Some(false), _) => println!("Contract:   not deployed"),
        _ => println!("Contract:   unresolved"),
    }
    println!("FHEVM:      {}", view.instance_status);
    match view.handle {
        Some(handle) => println!("Handle:     {handle}"),
        None => println!("Handle:     -"),
    }
    match view.clear {
        Some(clear) => println!("Count:      {clear} ({})", view.exposure()),
        None => println!("Count:      {}", view.exposure()),
    }
    if !view.message.is_empty() {
        println!("Status:     {}", view.message);
    }
    Ok(())
}

async fn watch(app: &CounterApp, json: bool) -> Result<()> {
    let mut views = app.controller.subscribe();
    let task = app.controller.spawn();
    info!("Watching counter; Ctrl-C to stop");

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                print_view(&view, json)?;
                println!();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping");
                break;
            }
        }
    }

    task.abort();
    Ok(())
}
