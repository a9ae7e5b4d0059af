//! EDA Controller Backend
//!
//! REST backend for event-driven automation projects: credentials, projects
//! and the background import of rulebooks from Git repositories.

mod api;
mod config;
mod db;
mod errors;
mod jobs;
mod models;
mod services;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Config, LogFormat};
use db::Repository;
use jobs::JobRunner;
use services::project::{ArchiveStore, GitCli, GitClient, ProjectImportService};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub jobs: JobRunner,
    pub archives: ArchiveStore,
}

impl AppState {
    pub fn new(pool: SqlitePool, git: Arc<dyn GitClient>, config: &Config) -> Self {
        let archives = ArchiveStore::new(&config.archive_dir);
        let service = ProjectImportService::new(pool.clone(), git, archives.clone());

        Self {
            repo: Arc::new(Repository::new(pool)),
            jobs: JobRunner::new(Arc::new(service)),
            archives,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);
    match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }

    tracing::info!("Starting EDA Controller Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Archive directory: {:?}", config.archive_dir);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;

    let git = Arc::new(GitCli::new(&config.git_bin));
    let state = AppState::new(pool, git, &config);

    // Jobs from a previous process will never finish
    let interrupted = state.repo.fail_interrupted_imports().await?;
    if interrupted > 0 {
        tracing::warn!("Marked {} interrupted project imports as failed", interrupted);
    }

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API routes
    let api_routes = Router::new()
        // Credentials
        .route(
            "/eda-credentials",
            get(api::list_credentials).post(api::create_credential),
        )
        .route(
            "/eda-credentials/{id}",
            get(api::get_credential)
                .patch(api::update_credential)
                .delete(api::delete_credential),
        )
        // Projects
        .route(
            "/projects",
            get(api::list_projects).post(api::create_project),
        )
        .route(
            "/projects/{id}",
            get(api::get_project)
                .patch(api::update_project)
                .delete(api::delete_project),
        )
        .route("/projects/{id}/sync", post(api::sync_project))
        .route("/projects/{id}/rulebooks", get(api::list_project_rulebooks));

    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
