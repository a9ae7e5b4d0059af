//! Project model and its import state.

use serde::{Deserialize, Serialize};

use super::{deserialize_some, EdaCredential};

/// Lifecycle of a project import or sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ImportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportState::Pending => "pending",
            ImportState::Running => "running",
            ImportState::Completed => "completed",
            ImportState::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ImportState::Pending),
            "running" => Some(ImportState::Running),
            "completed" => Some(ImportState::Completed),
            "failed" => Some(ImportState::Failed),
            _ => None,
        }
    }

    /// Whether a run is queued or executing.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ImportState::Pending | ImportState::Running)
    }
}

/// A Git repository of rulebooks imported into the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
    pub eda_credential_id: Option<i64>,
    pub signature_validation_credential_id: Option<i64>,
    pub verify_ssl: bool,
    /// Commit hash of the last successful import or sync
    pub git_hash: Option<String>,
    pub import_state: ImportState,
    pub import_error: Option<String>,
    pub import_task_id: Option<String>,
    /// Stored archive name, see [`crate::services::project::ArchiveStore`]
    pub archive_file: Option<String>,
    pub created_at: String,
    pub modified_at: String,
}

/// Project as rendered by the retrieve endpoint, with credentials embedded.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub eda_credential: Option<EdaCredential>,
    pub signature_validation_credential: Option<EdaCredential>,
}

/// Request body for creating (and importing) a project.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub url: String,
    #[serde(default)]
    pub eda_credential_id: Option<i64>,
    #[serde(default)]
    pub signature_validation_credential_id: Option<i64>,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
}

fn default_verify_ssl() -> bool {
    true
}

/// Request body for a partial project update.
///
/// Nullable fields distinguish an omitted field from an explicit `null`,
/// which clears the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProjectRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub eda_credential_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub signature_validation_credential_id: Option<Option<i64>>,
    #[serde(default)]
    pub verify_ssl: Option<bool>,
}

impl UpdateProjectRequest {
    /// Credential ids set to a concrete value by this request.
    pub fn credential_ids(&self) -> Vec<i64> {
        [self.eda_credential_id, self.signature_validation_credential_id]
            .into_iter()
            .flatten()
            .flatten()
            .collect()
    }
}
