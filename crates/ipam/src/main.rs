use clap::{Parser, Subcommand};
use ipam_api::{ApiServer, AppState, Config as ApiConfig, TlsMode};
use ipam_engine::SpaceService;
use ipam_inventory::InMemoryInventory;
use ipam_storage::RedbDocStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ipam", about = "IPv4 IPAM Engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Shared TLS arguments for the `serve` subcommand.
#[derive(clap::Args, Clone, Debug)]
struct TlsArgs {
    /// Enable TLS (HTTPS). When set without --tls-cert/--tls-key, a
    /// self-signed CA + server certificate is auto-generated.
    #[arg(long, default_value_t = false)]
    tls: bool,

    /// Path to a PEM-encoded TLS certificate (requires --tls)
    #[arg(long, requires = "tls")]
    tls_cert: Option<String>,

    /// Path to a PEM-encoded TLS private key (requires --tls)
    #[arg(long, requires = "tls")]
    tls_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the IPAM API server
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8443")]
        bind: String,
        /// Path to the redb database file
        #[arg(long, default_value = "./ipam.redb")]
        data_dir: String,
        #[command(flatten)]
        tls_args: TlsArgs,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, data_dir, tls_args } => run_serve(&bind, &data_dir, &tls_args).await,
    }
}

/// Wait for either SIGINT (ctrl-c) or SIGTERM, returning which one fired.
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

/// Derive a `TlsMode` from CLI arguments.
fn tls_mode_from_args(args: &TlsArgs, data_dir: &str) -> miette::Result<TlsMode> {
    if !args.tls {
        return Ok(TlsMode::Disabled);
    }

    match (&args.tls_cert, &args.tls_key) {
        (Some(cert), Some(key)) => {
            Ok(TlsMode::Provided { cert_path: PathBuf::from(cert), key_path: PathBuf::from(key) })
        }
        (None, None) => {
            let parent = PathBuf::from(data_dir).parent().unwrap_or_else(|| std::path::Path::new(".")).to_path_buf();
            Ok(TlsMode::AutoGenerate {
                data_dir: parent.join("tls"),
                san_entries: vec!["localhost".to_string(), "127.0.0.1".to_string()],
            })
        }
        _ => Err(miette::miette!(
            help = "Provide both --tls-cert and --tls-key, or omit both to auto-generate.",
            "When using --tls, you must supply both --tls-cert and --tls-key together"
        )),
    }
}

fn create_app_state(data_dir: &str) -> miette::Result<Arc<AppState>> {
    let store = RedbDocStore::new(data_dir)
        .map_err(|e| miette::miette!("Failed to open storage at '{}': {}", data_dir, e))?;
    let inventory = InMemoryInventory::new();
    let service = SpaceService::new(Arc::new(store), Arc::new(inventory));
    Ok(Arc::new(AppState::new(Arc::new(service))))
}

/// Run the API server until SIGINT/SIGTERM, then shut it down gracefully.
async fn run_serve(bind: &str, data_dir: &str, tls_args: &TlsArgs) -> miette::Result<()> {
    info!("Starting IPAM API server");

    let state = create_app_state(data_dir)?;
    let tls_mode = tls_mode_from_args(tls_args, data_dir)?;

    let config = ApiConfig {
        listen_addr: bind.parse().map_err(|e| miette::miette!("Invalid bind address '{}': {}", bind, e))?,
        tls_mode,
    };

    let token = CancellationToken::new();
    let server = ApiServer::new(config, state);
    let server_token = token.clone();

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(server_token).await {
            error!("API server error: {}", e);
        }
    });

    let sig = shutdown_signal().await;
    info!("Received {}, shutting down gracefully...", sig);
    token.cancel();

    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), server_handle).await;
    info!("Shutdown complete");

    Ok(())
}
