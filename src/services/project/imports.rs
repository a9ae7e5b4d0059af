//! Project import and sync runs.
//!
//! A run clones the project, scans the checkout for rulebooks, applies them
//! to the database and stores an archive of the checkout. Its progress is
//! tracked on the project's `import_state`:
//!
//! ```text
//! pending ──▶ running ──▶ completed
//!                    └──▶ failed (import_error set)
//! ```
//!
//! `running` is persisted before any work starts. Clone and archive happen
//! before the database transaction is opened. All rulebook changes and the
//! new `git_hash`/`archive_file` are then written in one transaction together
//! with `completed`, so a failed run leaves no partial rows behind.

use std::path::Path;
use std::sync::Arc;

use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;
use tracing::{error, info};

use super::git::{ArchiveFormat, CloneOptions, GitClient, GitError, GitRepo};
use super::rulebooks::{import_rulebooks, sync_rulebooks};
use super::{ArchiveStore, RulebookScanner};
use crate::db::imports;
use crate::models::{ImportState, Project};

/// Prefix of the scratch directory used by a run.
pub const TMP_PREFIX: &str = "eda-project-";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(
        "The 'extensions/eda/rulebooks' or 'rulebooks' directory doesn't exist within the project root."
    )]
    MissingRulebooksDir,

    #[error("Project {0} not found")]
    ProjectNotFound(i64),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid rulebook {path}: {message}")]
    InvalidContent { path: String, message: String },
}

/// Which kind of run to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// First import: every rulebook found is created
    Import,
    /// Re-import: rulebooks are reconciled with the stored ones
    Sync,
}

/// Imports and syncs projects.
#[derive(Clone)]
pub struct ProjectImportService {
    pool: SqlitePool,
    git: Arc<dyn GitClient>,
    archives: ArchiveStore,
}

impl ProjectImportService {
    pub fn new(pool: SqlitePool, git: Arc<dyn GitClient>, archives: ArchiveStore) -> Self {
        Self {
            pool,
            git,
            archives,
        }
    }

    /// Load a project and run an import or sync on it.
    pub async fn run_job(&self, mode: ImportMode, project_id: i64) -> Result<(), ImportError> {
        let mut conn = self.pool.acquire().await?;
        let mut project = imports::load_project(&mut *conn, project_id)
            .await?
            .ok_or(ImportError::ProjectNotFound(project_id))?;
        drop(conn);

        match mode {
            ImportMode::Import => self.import_project(&mut project).await,
            ImportMode::Sync => self.sync_project(&mut project).await,
        }
    }

    /// Import a freshly created project.
    pub async fn import_project(&self, project: &mut Project) -> Result<(), ImportError> {
        self.run_tracked(project, ImportMode::Import).await
    }

    /// Re-import a project, applying upstream changes to its rulebooks.
    pub async fn sync_project(&self, project: &mut Project) -> Result<(), ImportError> {
        self.run_tracked(project, ImportMode::Sync).await
    }

    /// Run `mode` with import state tracking.
    ///
    /// Failures are recorded on the project before being returned.
    async fn run_tracked(&self, project: &mut Project, mode: ImportMode) -> Result<(), ImportError> {
        project.import_state = ImportState::Running;
        self.save_import_state(project).await?;
        info!(project_id = project.id, ?mode, "Project import started");

        let git_hash = project.git_hash.clone();
        let archive_file = project.archive_file.clone();

        let result = match mode {
            ImportMode::Import => self.import_body(project).await,
            ImportMode::Sync => self.sync_body(project).await,
        };

        match result {
            Ok(()) => {
                info!(
                    project_id = project.id,
                    git_hash = project.git_hash.as_deref().unwrap_or_default(),
                    "Project import completed"
                );
                Ok(())
            }
            Err(err) => {
                error!(project_id = project.id, ?mode, "Project import failed: {}", err);

                // Only committed results may be visible on the project.
                project.git_hash = git_hash;
                project.archive_file = archive_file;
                project.import_state = ImportState::Failed;
                project.import_error = Some(err.to_string());
                // If this save fails too the row stays `running` until
                // `Repository::fail_interrupted_imports` runs at startup.
                if let Err(save_err) = self.save_import_state(project).await {
                    error!(
                        project_id = project.id,
                        "Failed to record import failure: {}", save_err
                    );
                }
                Err(err)
            }
        }
    }

    async fn import_body(&self, project: &mut Project) -> Result<(), ImportError> {
        let workdir = self.temporary_directory()?;
        let repo_dir = workdir.path().join("src");

        let repo = self.clone_project(project, &repo_dir).await?;
        project.git_hash = Some(repo.rev_parse("HEAD").await?);

        let scanner = RulebookScanner::new(&repo_dir)?;
        self.save_project_archive(project, repo.as_ref(), workdir.path())
            .await?;

        // The first statement writes, so the transaction owns the write lock
        // from the start and holds it only for the database work.
        let mut tx = self.pool.begin().await?;
        imports::save_project_import(&mut *tx, project).await?;

        let created = import_rulebooks(&mut *tx, project.id, scanner).await?;
        info!(project_id = project.id, created, "Imported rulebooks");

        self.commit_completed(tx, project).await
    }

    async fn sync_body(&self, project: &mut Project) -> Result<(), ImportError> {
        let workdir = self.temporary_directory()?;
        let repo_dir = workdir.path().join("src");

        let repo = self.clone_project(project, &repo_dir).await?;
        let git_hash = repo.rev_parse("HEAD").await?;

        if project.git_hash.as_deref() == Some(git_hash.as_str()) {
            info!(
                "Project (id={}, name={}) is up to date. Nothing to sync.",
                project.id, project.name
            );
            let tx = self.pool.begin().await?;
            return self.commit_completed(tx, project).await;
        }

        project.git_hash = Some(git_hash);

        let scanner = RulebookScanner::new(&repo_dir)?;
        self.save_project_archive(project, repo.as_ref(), workdir.path())
            .await?;

        let mut tx = self.pool.begin().await?;
        imports::save_project_import(&mut *tx, project).await?;

        let summary = sync_rulebooks(&mut *tx, project.id, scanner).await?;
        info!(
            project_id = project.id,
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            deleted = summary.deleted,
            "Synced rulebooks"
        );

        self.commit_completed(tx, project).await
    }

    fn temporary_directory(&self) -> std::io::Result<tempfile::TempDir> {
        tempfile::Builder::new().prefix(TMP_PREFIX).tempdir()
    }

    async fn clone_project(
        &self,
        project: &Project,
        dest: &Path,
    ) -> Result<Box<dyn GitRepo>, ImportError> {
        let credential = match project.eda_credential_id {
            Some(id) => {
                let mut conn = self.pool.acquire().await?;
                imports::load_credential(&mut *conn, id).await?
            }
            None => None,
        };

        let options = CloneOptions {
            credential,
            depth: Some(1),
            verify_ssl: project.verify_ssl,
        };
        Ok(self.git.clone_repo(&project.url, dest, &options).await?)
    }

    async fn save_project_archive(
        &self,
        project: &mut Project,
        repo: &dyn GitRepo,
        workdir: &Path,
    ) -> Result<(), ImportError> {
        let archive_file = workdir.join("archive.tar.gz");
        repo.archive("HEAD", &archive_file, ArchiveFormat::TarGz)
            .await?;

        project.archive_file = Some(self.archives.save(project.id, &archive_file).await?);
        Ok(())
    }

    async fn commit_completed(
        &self,
        mut tx: Transaction<'static, Sqlite>,
        project: &mut Project,
    ) -> Result<(), ImportError> {
        project.import_state = ImportState::Completed;
        imports::save_project_import(&mut *tx, project).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn save_import_state(&self, project: &Project) -> Result<(), ImportError> {
        let mut conn = self.pool.acquire().await?;
        imports::save_import_state(&mut *conn, project).await?;
        Ok(())
    }
}
