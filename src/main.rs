//! Guardian entry point.
//!
//! Bootstraps the server:
//! 1. Load configuration from environment
//! 2. Open the snapshot store and restore keys and sessions
//! 3. Spawn the cleanup loop
//! 4. Build the router and start Axum
//!
//! Also supports `keygen` and `sign` subcommands for deriving client keys.

use mcm_guardian::{
    auth::middleware::AppState,
    cleanup,
    clock::{Clock, SystemClock},
    config::Config,
    keygen::{derive_signing_key, public_key_b64, sign_challenge},
    routes, storage,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  mcm-guardian                                    run the server");
    eprintln!("  mcm-guardian keygen <kid> <passphrase>          print the public key");
    eprintln!("  mcm-guardian sign <kid> <passphrase> <aud> <nonce>");
    eprintln!("                                                  print a signed assertion");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  PUB=$(mcm-guardian keygen phone 'correct horse')");
    eprintln!("  curl -X POST localhost:8000/admin/register_pubkey \\");
    eprintln!("       -d \"{{\\\"kid\\\":\\\"phone\\\",\\\"pub\\\":\\\"$PUB\\\"}}\"");
}

/// Handle a CLI subcommand. Returns the process exit code, or `None` to run the server.
fn run_subcommand(args: &[String]) -> Option<i32> {
    let command = args.get(1)?;
    let result = match (command.as_str(), &args[2..]) {
        ("keygen", [kid, passphrase]) => {
            derive_signing_key(kid, passphrase).map(|key| public_key_b64(&key))
        }
        ("sign", [kid, passphrase, aud, nonce]) => {
            let ts = SystemClock.now_secs() as i64;
            sign_challenge(kid, passphrase, aud, nonce, ts)
        }
        _ => {
            print_usage();
            return Some(1);
        }
    };

    match result {
        Ok(output) => {
            println!("{}", output);
            Some(0)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            Some(1)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    if let Some(code) = run_subcommand(&args) {
        std::process::exit(code);
    }

    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config from environment
    let config = Config::from_env().expect("Failed to load config");
    tracing::info!("Starting mcm-guardian on {}", config.bind_addr);
    tracing::debug!(?config, "Loaded configuration");

    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN is not set: admin endpoints are open to anyone");
    }

    let store = storage::open(&config)
        .await
        .expect("Failed to open snapshot store");
    tracing::info!(backend = store.backend_name(), "Snapshot store ready");

    let bind_addr = config.bind_addr;
    let cleanup_interval = Duration::from_secs(config.cleanup_interval_secs);
    let state = AppState::new(config, Arc::new(SystemClock), store);

    let restored = state.auth.load_snapshots().await;
    tracing::info!(
        keys = restored.keys,
        sessions = restored.sessions,
        "Restored persisted state"
    );

    tokio::spawn(cleanup::run_cleanup_loop(state.clone(), cleanup_interval));

    let app = routes::app(state);

    // Bind to configured address
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Listening on {}", bind_addr);

    // Start server (with_connect_info required for ConnectInfo<SocketAddr> extractors)
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");
}
