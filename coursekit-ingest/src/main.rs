//! coursekit-ingest - course archive import service
//!
//! Accepts ZIP course archives from administrators, uploads their assets to
//! object storage and writes the course/module/unit tree to SQLite.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coursekit_common::auth::{create_user, issue_session, SqliteIdentityProvider};
use coursekit_common::config::{ensure_root_folder, resolve_root_folder};
use coursekit_ingest::config::{IngestConfig, ObjectStoreConfig, CONFIG_FILE_NAME, DB_FILE_NAME};
use coursekit_ingest::db::{init_database_pool, SqliteCourseStore};
use coursekit_ingest::services::CourseImporter;
use coursekit_ingest::storage::{HttpObjectStore, LocalObjectStore, ObjectStore};
use coursekit_ingest::{build_router, AppState};
use sqlx::SqlitePool;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "coursekit-ingest")]
#[command(about = "Course archive import service")]
#[command(version)]
struct Args {
    /// Root folder holding the database, config and local object store
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// HTTP port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file (default: <root>/coursekit-ingest.toml)
    #[arg(short, long, env = "COURSEKIT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user and print a session token for it
    IssueToken {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "admin")]
        role: String,
        #[arg(long, default_value = "24")]
        ttl_hours: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coursekit_ingest=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting coursekit-ingest v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), "COURSEKIT_ROOT_FOLDER");
    let default_db_path = ensure_root_folder(&root_folder, DB_FILE_NAME)
        .context("Failed to prepare root folder")?;
    info!("Root folder: {}", root_folder.display());

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| root_folder.join(CONFIG_FILE_NAME));
    let mut config = IngestConfig::load(&config_path).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }

    let db_path = config.database_path.clone().unwrap_or(default_db_path);
    let db_pool = init_database_pool(&db_path)
        .await
        .context("Failed to initialize database")?;
    info!("Database ready: {}", db_path.display());

    if let Some(Command::IssueToken {
        email,
        role,
        ttl_hours,
    }) = args.command
    {
        return issue_token(&db_pool, &email, &role, ttl_hours).await;
    }

    let object_store = build_object_store(&config, &root_folder)?;
    info!("Object store: {}", object_store.name());

    let store = Arc::new(SqliteCourseStore::new(db_pool.clone()));
    let identity = Arc::new(SqliteIdentityProvider::new(db_pool.clone()));
    let importer = Arc::new(CourseImporter::new(
        identity,
        store.clone(),
        object_store,
        config.importer_settings(),
    ));

    let state = AppState::new(db_pool, store, importer);
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind_address, config.port))?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn build_object_store(config: &IngestConfig, root_folder: &Path) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match &config.object_store {
        ObjectStoreConfig::Local {
            directory,
            public_base_url,
        } => {
            let directory = directory
                .clone()
                .unwrap_or_else(|| root_folder.join("objects"));
            std::fs::create_dir_all(&directory).with_context(|| {
                format!("Failed to create object directory {}", directory.display())
            })?;
            let mut local = LocalObjectStore::new(directory);
            if let Some(url) = public_base_url {
                local = local.with_public_base_url(url.clone());
            }
            Arc::new(local)
        }
        ObjectStoreConfig::Http {
            base_url,
            bucket,
            api_key,
        } => Arc::new(
            HttpObjectStore::new(
                base_url,
                bucket,
                api_key.clone(),
                config.importer_settings().upload_timeout,
            )
            .context("Failed to build object storage client")?,
        ),
    };
    Ok(store)
}

async fn issue_token(pool: &SqlitePool, email: &str, role: &str, ttl_hours: i64) -> Result<()> {
    let user_id = create_user(pool, email, role)
        .await
        .with_context(|| format!("Failed to create user {}", email))?;
    let token = issue_session(pool, user_id, chrono::Duration::hours(ttl_hours.max(1)))
        .await
        .context("Failed to issue session")?;

    info!(user = %email, role = %role, "Session issued");
    println!("{}", token);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
