use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use creditflow_db::Db;
use creditflow_service::{ActivityService, HttpDirectory, IdentityDirectory, StaticDirectory};
use creditflow_store::{create_store, StoreConfig};

#[derive(Parser)]
#[command(name = "creditflow-server")]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "CREDITFLOW_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on.
    #[arg(long, env = "CREDITFLOW_PORT", default_value_t = 3720)]
    port: u16,

    /// SQLite database path. Defaults to the shared data directory.
    #[arg(long, env = "CREDITFLOW_DB")]
    db: Option<PathBuf>,

    /// Base directory for stored files. Defaults to the shared data
    /// directory.
    #[arg(long, env = "CREDITFLOW_DATA_DIR")]
    data_dir: Option<String>,

    /// Base URL of the user service. Without it participant profiles
    /// cannot be resolved, so ledger writes will fail validation.
    #[arg(long, env = "CREDITFLOW_USER_SERVICE_URL")]
    user_service_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let db = match cli.db {
        Some(ref path) => Db::open(path)?,
        None => Db::open_default()?,
    };
    let store = create_store(&StoreConfig {
        data_dir: cli.data_dir,
    });
    let directory: Arc<dyn IdentityDirectory> = match cli.user_service_url {
        Some(url) => Arc::new(HttpDirectory::new(url)),
        None => {
            tracing::warn!("no user service configured; participant lookups will fail");
            Arc::new(StaticDirectory::new())
        }
    };

    let service = ActivityService::new(db, store, directory);

    let addr = SocketAddr::new(cli.bind.parse()?, cli.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "creditflow-server listening");

    creditflow_server::serve(listener, service).await
}
