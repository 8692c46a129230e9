//! `msgpushd`: the message push server binary.
//!
//! Usage:
//!   msgpushd -c <context-name-or-path> [--listen <addr>]
//!
//! The context name resolves to `/etc/msgpush/<name>.toml`.
//! If a path with `/` or `.` is given, it's used directly.

mod bootstrap;
mod config;

use std::sync::Arc;

use axum::Router;
use clap::Parser;
use msgpush_core::Module;
use tracing::info;

use config::ServerConfig;

/// Message push server.
#[derive(Parser, Debug)]
#[command(name = "msgpushd", about = "Message push server")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: String,

    /// Listen address.
    #[arg(long = "listen", default_value = "0.0.0.0:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config_path = ServerConfig::resolve_path(&cli.config);
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(&config_path)?;
    bootstrap::verify_config(&server_config)?;

    let core_config = server_config.service_config(&cli.listen);
    if let Some(data_dir) = &core_config.data_dir {
        std::fs::create_dir_all(data_dir)?;
    }

    let kv: Arc<dyn msgpush_kv::KVStore> = Arc::new(
        msgpush_kv::RedbStore::open(&core_config.resolve_cache_path())
            .map_err(|e| anyhow::anyhow!("failed to open cache store: {}", e))?,
    );
    let sql: Arc<dyn msgpush_sql::SQLStore> = Arc::new(
        msgpush_sql::SqliteStore::open(&core_config.resolve_sqlite_path())
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );

    let message_module = message::MessageModule::new(sql, kv, server_config.edit_config())?;
    info!("Message module initialized");

    let modules: Vec<&dyn Module> = vec![&message_module];
    let mut app = Router::new();
    for module in modules {
        info!("Mounting {} routes", module.name());
        app = app.merge(module.routes());
    }

    let listener = tokio::net::TcpListener::bind(&core_config.listen).await?;
    info!("msgpushd listening on {}", core_config.listen);
    axum::serve(listener, app).await?;

    Ok(())
}
