//! EDA credential API endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;

use super::{created, no_content, ok, ApiResult};
use crate::errors::AppError;
use crate::models::{
    CreateCredentialRequest, CredentialFilter, EdaCredential, EdaCredentialDetail,
    UpdateCredentialRequest,
};
use crate::AppState;

/// Raw query pairs; list filters may repeat a key.
type QueryPairs = Query<Vec<(String, String)>>;

/// GET /api/eda-credentials - List unmanaged credentials.
pub async fn list_credentials(
    State(state): State<AppState>,
    Query(params): QueryPairs,
) -> ApiResult<Vec<EdaCredential>> {
    let mut filter = CredentialFilter::default();
    for (key, value) in params {
        match key.as_str() {
            "credential_type__kind" => filter.kinds.push(value),
            "name" => filter.name = Some(value),
            _ => {}
        }
    }

    let credentials = state.repo.list_credentials(&filter).await?;
    ok(credentials.iter().map(EdaCredential::masked).collect())
}

/// GET /api/eda-credentials/{id} - Get a credential, optionally with its references.
pub async fn get_credential(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): QueryPairs,
) -> ApiResult<EdaCredentialDetail> {
    let credential = find_credential(&state, id).await?;

    let references = if query_flag(&params, "refs") {
        Some(state.repo.credential_references(id).await?)
    } else {
        None
    };

    ok(EdaCredentialDetail {
        credential: credential.masked(),
        references,
    })
}

/// POST /api/eda-credentials - Create a credential.
pub async fn create_credential(
    State(state): State<AppState>,
    Json(request): Json<CreateCredentialRequest>,
) -> ApiResult<EdaCredential> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    if request.credential_type.trim().is_empty() {
        return Err(AppError::Validation("Credential type is required".to_string()));
    }
    if !request.inputs.is_object() {
        return Err(AppError::Validation("Inputs must be an object".to_string()));
    }

    let credential = state.repo.create_credential(&request).await?;
    tracing::info!(credential_id = credential.id, "Created credential {}", credential.name);
    created(credential.masked())
}

/// PATCH /api/eda-credentials/{id} - Partially update a credential.
pub async fn update_credential(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateCredentialRequest>,
) -> ApiResult<EdaCredential> {
    if matches!(&request.name, Some(name) if name.trim().is_empty()) {
        return Err(AppError::Validation("Name cannot be blank".to_string()));
    }
    if matches!(&request.inputs, Some(inputs) if !inputs.is_object()) {
        return Err(AppError::Validation("Inputs must be an object".to_string()));
    }

    let credential = state.repo.update_credential(id, &request).await?;
    ok(credential.masked())
}

/// DELETE /api/eda-credentials/{id} - Delete a credential.
///
/// Referenced credentials are only deleted with `?force=true`; the references
/// are cleared.
pub async fn delete_credential(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): QueryPairs,
) -> ApiResult<()> {
    let credential = find_credential(&state, id).await?;
    if credential.managed {
        return Err(AppError::BadRequest(
            "Managed EDA credential cannot be deleted".to_string(),
        ));
    }

    let references = state.repo.credential_references(id).await?;
    if !references.is_empty() && !query_flag(&params, "force") {
        return Err(AppError::Conflict(format!(
            "Credential {} is being referenced by other resources and cannot be deleted. \
             If you want to force delete, please add /?force=true query param.",
            credential.name
        )));
    }

    state.repo.delete_credential(id).await?;
    tracing::info!(
        credential_id = id,
        references = references.len(),
        "Deleted credential {}",
        credential.name
    );
    no_content()
}

async fn find_credential(state: &AppState, id: i64) -> Result<EdaCredential, AppError> {
    state
        .repo
        .get_credential(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("EdaCredential {} not found", id)))
}

/// Whether a boolean query parameter is set (`true`, `1` or `yes`).
fn query_flag(params: &[(String, String)], key: &str) -> bool {
    params
        .iter()
        .filter(|(k, _)| k == key)
        .any(|(_, v)| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
}
