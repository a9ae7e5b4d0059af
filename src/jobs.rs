//! Background jobs for project import and sync.
//!
//! Jobs run on the tokio runtime of the server process. A job id is handed
//! out before the job is spawned so callers can persist it first.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use crate::services::project::{ImportError, ImportMode, ProjectImportService};

/// A spawned job.
pub struct JobHandle {
    pub id: String,
    pub join: JoinHandle<Result<(), ImportError>>,
}

/// Spawns import and sync jobs.
#[derive(Clone)]
pub struct JobRunner {
    service: Arc<ProjectImportService>,
}

impl JobRunner {
    pub fn new(service: Arc<ProjectImportService>) -> Self {
        Self { service }
    }

    pub fn new_job_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Spawn a job under a previously generated id.
    pub fn spawn(&self, id: String, mode: ImportMode, project_id: i64) -> JobHandle {
        let service = self.service.clone();
        let span = info_span!("project_job", job_id = %id, project_id, ?mode);

        let join = tokio::spawn(
            async move {
                let result = service.run_job(mode, project_id).await;
                if let Err(err) = &result {
                    warn!("Job finished with error: {}", err);
                }
                result
            }
            .instrument(span),
        );

        JobHandle { id, join }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_database, Repository};
    use crate::models::{CreateProjectRequest, ImportState};
    use crate::services::project::testing::FakeGit;
    use crate::services::project::ArchiveStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_spawned_job_runs_import() {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("jobs.sqlite")).await.unwrap();
        let repo = Repository::new(pool.clone());
        let git = Arc::new(FakeGit::new());
        git.set_files(&[("rulebooks/app.yml", "- rules: []\n")]);

        let service = ProjectImportService::new(
            pool,
            git.clone(),
            ArchiveStore::new(dir.path().join("archives")),
        );
        let runner = JobRunner::new(Arc::new(service));

        let project = repo
            .create_project(&CreateProjectRequest {
                name: "jobs".to_string(),
                description: None,
                url: "https://git.example.com/jobs.git".to_string(),
                eda_credential_id: None,
                signature_validation_credential_id: None,
                verify_ssl: true,
            })
            .await
            .unwrap();

        let job_id = JobRunner::new_job_id();
        assert!(Uuid::parse_str(&job_id).is_ok());
        let handle = runner.spawn(job_id.clone(), ImportMode::Import, project.id);
        assert_eq!(handle.id, job_id);
        handle.join.await.unwrap().unwrap();

        let stored = repo.get_project(project.id).await.unwrap().unwrap();
        assert_eq!(stored.import_state, ImportState::Completed);
        assert_eq!(git.clone_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_job_error_is_returned() {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("jobs.sqlite")).await.unwrap();
        let service = ProjectImportService::new(
            pool,
            Arc::new(FakeGit::new()),
            ArchiveStore::new(dir.path().join("archives")),
        );
        let runner = JobRunner::new(Arc::new(service));

        let handle = runner.spawn("job-1".to_string(), ImportMode::Sync, 404);
        assert_eq!(handle.id, "job-1");
        let err = handle.join.await.unwrap().unwrap_err();
        assert!(matches!(err, ImportError::ProjectNotFound(404)));
    }
}
