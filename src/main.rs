use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use trikhub_config::{ConfigStore, ConfigStoreOptions, RegistryConfig};
use trikhub_gateway::{GatewayConfig, TrikGateway};
use trikhub_server::ServerConfig;
use trikhub_store::{Database, MemoryStorage, SqliteStorage, StorageBackend};

#[derive(Parser)]
#[command(name = "trikhub", about = "TrikHub security gateway server")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 8787)]
    port: u16,

    /// Log level (trace, debug, info, warn, error). Overridden by RUST_LOG.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Project root containing .trikhub/. Defaults to the current directory.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Path to the storage database. Defaults to ~/.trikhub/storage.db.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Keep storage in memory only (lost on shutdown).
    #[arg(long)]
    ephemeral: bool,

    /// Shared secret for bearer auth; auth is disabled when absent.
    #[arg(long, env = "TRIKHUB_AUTH_TOKEN")]
    auth_token: Option<String>,
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let root = args
        .root
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    tracing::info!(port = args.port, root = %root.display(), "starting TrikHub gateway");

    let storage: Arc<dyn StorageBackend> = if args.ephemeral {
        Arc::new(MemoryStorage::new())
    } else {
        let db_path = args
            .db_path
            .unwrap_or_else(|| home_dir().join(".trikhub").join("storage.db"));
        match Database::open(&db_path) {
            Ok(db) => Arc::new(SqliteStorage::new(db)),
            Err(e) => {
                tracing::error!(path = %db_path.display(), error = %e, "failed to open storage database");
                std::process::exit(1);
            }
        }
    };

    let mut config_store = ConfigStore::new(ConfigStoreOptions {
        global_path: Some(home_dir().join(".trikhub").join("secrets.json")),
        local_path: Some(root.join(".trikhub").join("secrets.json")),
    });
    if let Err(e) = config_store.load() {
        tracing::warn!(error = %e, "failed to load secrets");
    }

    let gateway = Arc::new(TrikGateway::new(GatewayConfig {
        storage,
        config_store,
        ..Default::default()
    }));

    let registry_path = RegistryConfig::default_path(&root);
    match gateway.load_triks_from_config(&registry_path, None) {
        Ok(manifests) => {
            tracing::info!(count = manifests.len(), "triks loaded");
        }
        Err(e) => tracing::warn!(error = %e, "failed to load triks from config"),
    }

    let server_config = ServerConfig {
        port: args.port,
        auth_token: args.auth_token,
    };

    let serve_gateway = Arc::clone(&gateway);
    tokio::select! {
        result = trikhub_server::serve(serve_gateway, server_config) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    gateway.shutdown().await;
}
