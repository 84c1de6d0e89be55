// Listra Gateway - Main Entry Point
//
// This is the gateway process that manages:
// - The gated generation API
// - Fixed-window rate limiting with periodic cleanup
// - Entitlement resolution and usage accounting
// - Prometheus metrics

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use listra_gateway::account::{AccountStore, InMemoryAccountStore};
use listra_gateway::config::Config;
use listra_gateway::gateway::entitlement::EntitlementResolver;
use listra_gateway::gateway::gate::RequestGate;
use listra_gateway::gateway::limiter::RateLimiterStore;
use listra_gateway::gateway::usage::spawn_usage_reset;
use listra_gateway::generate::{HttpGenerator, ListingGenerator, StubGenerator};
use listra_gateway::http::{router, AppState};
use listra_gateway::identity::StaticKeyIdentity;
use listra_gateway::{metrics, metrics_server};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Listra: hosted listing generation
#[derive(Parser, Debug)]
#[command(name = "listra")]
#[command(author = "Listra Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Quota & entitlement gateway for listing generation", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to a configuration file (defaults to the XDG config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Gateway command to run
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the gateway API
    Serve,
    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(filter.into())
                .from_env_lossy(),
        )
        .init();

    info!("Listra Gateway v0.1.0 starting...");

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match args.command {
        Some(Commands::CheckConfig) => {
            config.validate()?;
            info!("Configuration is valid");
            Ok(())
        }
        Some(Commands::Serve) | None => serve(config).await,
    }
}

/// Run the gateway until interrupted.
async fn serve(config: Config) -> Result<()> {
    config.validate()?;

    metrics::init().context("Failed to initialize metrics")?;

    // Explicit limiter registry, built once and passed down; no global
    // mutable state.
    let limiters = Arc::new(RateLimiterStore::new(&config.rate_limit.limiters)?);
    let _sweeper = limiters.spawn_sweeper(config.rate_limit.sweep_interval());

    let accounts: Arc<dyn AccountStore> = Arc::new(InMemoryAccountStore::new());
    let _usage_reset = spawn_usage_reset(
        Arc::clone(&accounts),
        config.entitlement.usage_reset_period,
    );

    let resolver = EntitlementResolver::new(config.entitlement.ceilings());
    let gate = RequestGate::new(
        resolver,
        &limiters,
        "generation",
        Arc::clone(&accounts),
        config.entitlement.trial_period(),
    )?;

    let generator: Arc<dyn ListingGenerator> = match &config.generator.upstream_url {
        Some(url) => {
            info!("Using upstream generator at {}", url);
            Arc::new(HttpGenerator::new(url.clone(), config.generator.timeout())?)
        }
        None => {
            info!("No upstream generator configured, using local stub");
            Arc::new(StubGenerator)
        }
    };

    let state = AppState {
        gate,
        identity: Arc::new(StaticKeyIdentity::new(config.identity.api_keys.clone())),
        generator,
        accounts,
        admin_token: config.admin.token.clone(),
    };

    if config.metrics.enabled {
        let metrics_port = config.metrics.port;
        tokio::spawn(async move {
            if let Err(err) = metrics_server::start_metrics_server(metrics_port).await {
                tracing::error!("Metrics server error: {}", err);
            }
        });
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid server address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    info!("Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind gateway server")?;

    axum::serve(listener, router(state))
        .await
        .context("Gateway server error")?;

    Ok(())
}
