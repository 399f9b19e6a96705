use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gigacrew_config::{Config, ConfigLoader};
use gigacrew_core::GigaCrewClient;
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gigacrew")]
#[command(about = "GigaCrew marketplace agent", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/gigacrew.toml")]
	config: PathBuf,

	/// Overrides the configured log level
	#[arg(long)]
	log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the agent
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

	let log_level = cli
		.log_level
		.clone()
		.unwrap_or_else(|| config.gigacrew.log_level.clone());
	setup_tracing(&log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_agent(config).await,
		Some(Commands::Validate) => validate_config(&cli, &config),
	}
}

async fn start_agent(config: Config) -> Result<()> {
	info!("Starting GigaCrew agent {}", config.gigacrew.name);

	let client = GigaCrewClient::builder(config)
		.build()
		.await
		.context("Failed to build agent")?;

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let agent = tokio::spawn(client.run(shutdown_rx));

	setup_shutdown_signal().await;
	info!("Shutdown signal received, stopping agent...");

	shutdown_tx
		.send(true)
		.context("Agent stopped before shutdown")?;
	agent.await.context("Agent task failed")?;

	info!("GigaCrew agent stopped");
	Ok(())
}

fn validate_config(cli: &Cli, config: &Config) -> Result<()> {
	info!("Configuration {:?} is valid", cli.config);
	info!("Agent name: {}", config.gigacrew.name);
	info!("RPC endpoint: {}", config.chain.rpc_url);
	info!("Contract: {}", config.chain.contract_address);
	info!("Roles:");
	if config.buyer.is_some() {
		info!("  buyer");
	}
	if let Some(seller) = &config.seller {
		info!("  seller (service {:?})", seller.service_id);
	}
	if config.catalog.as_ref().is_some_and(|c| c.enabled) {
		info!("  catalog indexer");
	}
	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
		.context("Invalid log level")?;

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!("Failed to listen for Ctrl+C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut sigterm) => {
				sigterm.recv().await;
			}
			Err(e) => {
				error!("Failed to install SIGTERM handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
