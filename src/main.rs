//! CLI entry point for the callback gateway.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use grantbridge::config::Config;
use grantbridge::idempotency::IdempotencyStore;
use grantbridge::partners::InMemoryPartnerDirectory;
use grantbridge::web::auth::ServiceAuthState;
use grantbridge::web::server::{GatewayState, start_server};

#[derive(Parser)]
#[command(name = "grantbridge", about = "GrantBridge partner callback gateway")]
struct Cli {
    /// Load an explicit dotenv file before resolving configuration.
    #[arg(long)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway (default).
    Serve,
    /// Resolve configuration and print a diagnostic summary without serving.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.env_file {
        dotenvy::from_path(path)
            .with_context(|| format!("failed to load env file {}", path.display()))?;
    } else {
        let _ = dotenvy::dotenv();
    }

    init_tracing();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Check => check(),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("grantbridge=info,tower_http=warn"));
    let json_output = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_output {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = Config::resolve().context("configuration resolution failed")?;

    let state = Arc::new(GatewayState {
        partners: Arc::new(InMemoryPartnerDirectory::new()),
        idempotency: Arc::new(IdempotencyStore::new(config.idempotency.ttl_secs)),
        latency_warn_ms: config.callback_latency_warn_ms,
        max_drift_secs: config.auth.max_drift_secs,
        idempotency_ttl_secs: config.idempotency.ttl_secs,
        shutdown_tx: tokio::sync::RwLock::new(None),
    });
    let auth = ServiceAuthState {
        secret: config.auth.secret.clone(),
        disabled: config.auth.disabled,
        max_drift_secs: config.auth.max_drift_secs,
        protected_prefixes: config.auth.protected_prefixes.clone(),
    };

    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid bind address {}:{}",
                config.gateway.host, config.gateway.port
            )
        })?;
    let bound = start_server(addr, state.clone(), auth)
        .await
        .context("gateway startup failed")?;
    tracing::info!(addr = %bound, "Callback gateway listening");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("Ctrl-c received; shutting down");
    state.shutdown().await;
    Ok(())
}

fn check() -> anyhow::Result<()> {
    match Config::resolve() {
        Ok(config) => {
            println!("configuration: OK");
            println!(
                "  service auth: {}",
                if config.auth.disabled {
                    "DISABLED (local development only)"
                } else {
                    "enabled, secret present"
                }
            );
            println!("  max drift: {}s", config.auth.max_drift_secs);
            println!("  idempotency TTL: {}s", config.idempotency.ttl_secs);
            println!(
                "  protected prefixes: {}",
                config.auth.protected_prefixes.join(", ")
            );
            println!(
                "  bind address: {}:{}",
                config.gateway.host, config.gateway.port
            );
            println!(
                "  latency warn threshold: {}ms",
                config.callback_latency_warn_ms
            );
            Ok(())
        }
        Err(err) => {
            println!("configuration: FAILED");
            println!("  {err}");
            std::process::exit(1);
        }
    }
}
