use clap::{Parser, ValueEnum};
use lockpoint::infrastructure::StorageConfig;
use lockpoint::interfaces::http::{ServiceConfig, ServiceState, build_router};
use miette::{IntoDiagnostic, Result, miette};
use std::net::SocketAddr;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StorageMode {
    Auto,
    Memory,
    Sqlite,
}

#[derive(Debug, Parser)]
#[command(name = "lockpointd", version, about = "Lockpoint commitment registry service")]
struct Cli {
    /// Socket address to bind, e.g. 127.0.0.1:8090
    #[arg(long, default_value = "127.0.0.1:8090")]
    listen: SocketAddr,

    /// Storage backend. `auto` picks sqlite when a database url is configured.
    #[arg(long, value_enum, default_value_t = StorageMode::Auto, env = "LOCKPOINT_STORAGE")]
    storage: StorageMode,

    /// Sqlite url for durable persistence, e.g. sqlite:lockpoint.db
    #[arg(long, env = "LOCKPOINT_DATABASE_URL")]
    database_url: Option<String>,

    /// Max sqlite pool connections.
    #[arg(long, default_value_t = 5, env = "LOCKPOINT_SQLITE_MAX_CONNECTIONS")]
    sqlite_max_connections: u32,

    /// Shared secret for bearer tokens, at least 32 characters.
    #[arg(long, env = "LOCKPOINT_AUTH_SECRET")]
    auth_secret: String,

    /// Lifetime of minted tokens, in seconds.
    #[arg(long, default_value_t = 86_400, env = "LOCKPOINT_TOKEN_TTL_SECONDS")]
    token_ttl_seconds: u64,
}

fn resolve_storage(cli: &Cli) -> Result<StorageConfig> {
    let resolved_url = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let storage = match cli.storage {
        StorageMode::Memory => StorageConfig::Memory,
        StorageMode::Sqlite => {
            let database_url = resolved_url.ok_or_else(|| {
                miette!("storage=sqlite requires --database-url or LOCKPOINT_DATABASE_URL")
            })?;
            StorageConfig::Sqlite {
                database_url,
                max_connections: cli.sqlite_max_connections,
            }
        }
        StorageMode::Auto => {
            if let Some(database_url) = resolved_url {
                StorageConfig::Sqlite {
                    database_url,
                    max_connections: cli.sqlite_max_connections,
                }
            } else {
                StorageConfig::Memory
            }
        }
    };

    Ok(storage)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "lockpoint=info,info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let storage = resolve_storage(&cli)?;
    info!(backend = storage.label(), "starting lockpoint registry");

    let state = ServiceState::bootstrap(ServiceConfig {
        storage,
        auth_secret: cli.auth_secret,
        token_ttl_seconds: cli.token_ttl_seconds,
    })
    .await
    .into_diagnostic()?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .into_diagnostic()?;
    let addr = listener.local_addr().into_diagnostic()?;
    info!("lockpointd listening on {addr}");

    axum::serve(listener, app).await.into_diagnostic()?;

    Ok(())
}
