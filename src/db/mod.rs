//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for credentials, projects and imported rulebooks.

mod repository;
pub mod imports;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS eda_credentials (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            credential_type TEXT NOT NULL,
            inputs TEXT NOT NULL DEFAULT '{}',
            managed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            modified_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            url TEXT NOT NULL,
            eda_credential_id INTEGER REFERENCES eda_credentials(id) ON DELETE SET NULL,
            signature_validation_credential_id INTEGER
                REFERENCES eda_credentials(id) ON DELETE SET NULL,
            verify_ssl INTEGER NOT NULL DEFAULT 1,
            git_hash TEXT,
            import_state TEXT NOT NULL DEFAULT 'pending',
            import_error TEXT,
            import_task_id TEXT,
            archive_file TEXT,
            created_at TEXT NOT NULL,
            modified_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rulebooks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            path TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL,
            rulesets TEXT NOT NULL,
            created_at TEXT NOT NULL,
            modified_at TEXT NOT NULL,
            UNIQUE (project_id, path, name)
        );

        CREATE TABLE IF NOT EXISTS rulesets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rulebook_id INTEGER NOT NULL REFERENCES rulebooks(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            sources TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ruleset_id INTEGER NOT NULL REFERENCES rulesets(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            action TEXT NOT NULL DEFAULT '{}'
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Activations are only tracked here to keep their cached rulebook text current
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS activations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            rulebook_id INTEGER REFERENCES rulebooks(id) ON DELETE SET NULL,
            rulebook_rulesets TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_projects_import_state ON projects(import_state);
        CREATE INDEX IF NOT EXISTS idx_rulebooks_project ON rulebooks(project_id);
        CREATE INDEX IF NOT EXISTS idx_rulesets_rulebook ON rulesets(rulebook_id);
        CREATE INDEX IF NOT EXISTS idx_rules_ruleset ON rules(ruleset_id);
        CREATE INDEX IF NOT EXISTS idx_activations_rulebook ON activations(rulebook_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
