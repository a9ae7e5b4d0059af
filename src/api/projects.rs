//! Project API endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::{accepted, created, no_content, ok, ApiResult};
use crate::errors::AppError;
use crate::jobs::JobRunner;
use crate::models::{
    CreateProjectRequest, EdaCredential, Project, ProjectDetail, RulebookDetail,
    UpdateProjectRequest,
};
use crate::services::project::ImportMode;
use crate::AppState;

/// Query parameters for listing projects.
#[derive(Debug, Deserialize)]
pub struct ProjectListQuery {
    pub name: Option<String>,
}

/// GET /api/projects - List projects.
pub async fn list_projects(
    State(state): State<AppState>,
    Query(query): Query<ProjectListQuery>,
) -> ApiResult<Vec<Project>> {
    ok(state.repo.list_projects(query.name.as_deref()).await?)
}

/// POST /api/projects - Create a project and start importing it.
pub async fn create_project(
    State(state): State<AppState>,
    Json(request): Json<CreateProjectRequest>,
) -> ApiResult<Project> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    if request.url.trim().is_empty() {
        return Err(AppError::Validation("Url is required".to_string()));
    }

    let credential_ids = [
        request.eda_credential_id,
        request.signature_validation_credential_id,
    ];
    ensure_credentials_exist(&state, credential_ids.into_iter().flatten()).await?;

    let mut project = state.repo.create_project(&request).await?;

    let job_id = JobRunner::new_job_id();
    state.repo.set_import_task_id(project.id, &job_id).await?;
    project.import_task_id = Some(job_id.clone());
    state.jobs.spawn(job_id, ImportMode::Import, project.id);

    tracing::info!(
        project_id = project.id,
        url = %project.url,
        "Created project {}",
        project.name
    );
    created(project)
}

/// GET /api/projects/{id} - Get a project with its credentials.
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ProjectDetail> {
    let project = find_project(&state, id).await?;

    let eda_credential = embedded_credential(&state, project.eda_credential_id).await?;
    let signature_validation_credential =
        embedded_credential(&state, project.signature_validation_credential_id).await?;

    ok(ProjectDetail {
        project,
        eda_credential,
        signature_validation_credential,
    })
}

/// PATCH /api/projects/{id} - Partially update a project.
pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateProjectRequest>,
) -> ApiResult<Project> {
    find_project(&state, id).await?;

    if matches!(&request.name, Some(name) if name.trim().is_empty()) {
        return Err(AppError::Validation("Name cannot be blank".to_string()));
    }
    ensure_credentials_exist(&state, request.credential_ids()).await?;

    ok(state.repo.update_project(id, &request).await?)
}

/// DELETE /api/projects/{id} - Delete a project, its rulebooks and archive.
pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    let project = state.repo.delete_project(id).await?;
    if project.import_state.is_in_flight() {
        tracing::warn!(
            project_id = id,
            "Deleted project while its import was {}",
            project.import_state.as_str()
        );
    }

    if let Some(archive_file) = &project.archive_file {
        if let Err(e) = state.archives.remove(archive_file).await {
            tracing::warn!(
                project_id = id,
                "Failed to remove archive {}: {}",
                archive_file,
                e
            );
        }
    }

    tracing::info!(project_id = id, "Deleted project {}", project.name);
    no_content()
}

/// POST /api/projects/{id}/sync - Re-import a project from its repository.
pub async fn sync_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Project> {
    let job_id = JobRunner::new_job_id();
    let project = state.repo.request_project_sync(id, &job_id).await?;

    state.jobs.spawn(job_id, ImportMode::Sync, id);
    accepted(project)
}

/// GET /api/projects/{id}/rulebooks - Imported rulebooks with rulesets and rules.
pub async fn list_project_rulebooks(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<RulebookDetail>> {
    find_project(&state, id).await?;
    ok(state.repo.list_rulebook_details(id).await?)
}

async fn find_project(state: &AppState, id: i64) -> Result<Project, AppError> {
    state
        .repo
        .get_project(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {} not found", id)))
}

async fn embedded_credential(
    state: &AppState,
    id: Option<i64>,
) -> Result<Option<EdaCredential>, AppError> {
    let Some(id) = id else {
        return Ok(None);
    };
    Ok(state
        .repo
        .get_credential(id)
        .await?
        .map(|credential| credential.masked()))
}

async fn ensure_credentials_exist(
    state: &AppState,
    ids: impl IntoIterator<Item = i64>,
) -> Result<(), AppError> {
    for id in ids {
        if state.repo.get_credential(id).await?.is_none() {
            return Err(AppError::BadRequest(format!(
                "EdaCredential [{}] not found",
                id
            )));
        }
    }
    Ok(())
}
