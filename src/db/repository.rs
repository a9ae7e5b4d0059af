//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use super::imports;
use crate::errors::AppError;
use crate::models::{
    inputs_to_store, CreateCredentialRequest, CreateProjectRequest, CredentialFilter,
    CredentialReference, EdaCredential, ImportState, Project, RulebookDetail, RulesetDetail,
    UpdateCredentialRequest, UpdateProjectRequest,
};

pub(super) const CREDENTIAL_COLUMNS: &str =
    "id, name, description, credential_type, inputs, managed, created_at, modified_at";

pub(super) const PROJECT_COLUMNS: &str = "id, name, description, url, eda_credential_id, \
     signature_validation_credential_id, verify_ssl, git_hash, import_state, import_error, \
     import_task_id, archive_file, created_at, modified_at";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== CREDENTIAL OPERATIONS ====================

    /// List unmanaged credentials matching the filter.
    pub async fn list_credentials(
        &self,
        filter: &CredentialFilter,
    ) -> Result<Vec<EdaCredential>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM eda_credentials WHERE managed = 0 ORDER BY id",
            CREDENTIAL_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(credential_from_row)
            .filter(|c| filter.kinds.is_empty() || filter.kinds.contains(&c.credential_type))
            .filter(|c| {
                filter
                    .name
                    .as_ref()
                    .map_or(true, |name| c.name.contains(name.as_str()))
            })
            .collect())
    }

    /// Get a credential by ID.
    pub async fn get_credential(&self, id: i64) -> Result<Option<EdaCredential>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM eda_credentials WHERE id = ?",
            CREDENTIAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(credential_from_row))
    }

    /// Create a new credential.
    pub async fn create_credential(
        &self,
        request: &CreateCredentialRequest,
    ) -> Result<EdaCredential, AppError> {
        let now = Utc::now().to_rfc3339();
        let inputs = inputs_to_store(request.inputs.clone(), None);

        let result = sqlx::query(
            "INSERT INTO eda_credentials (name, description, credential_type, inputs, managed, created_at, modified_at) VALUES (?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&request.name)
        .bind(&request.description)
        .bind(&request.credential_type)
        .bind(inputs.to_string())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "EdaCredential", &request.name))?;

        Ok(EdaCredential {
            id: result.last_insert_rowid(),
            name: request.name.clone(),
            description: request.description.clone(),
            credential_type: request.credential_type.clone(),
            inputs,
            managed: false,
            created_at: now.clone(),
            modified_at: now,
        })
    }

    /// Apply a partial update to a credential.
    pub async fn update_credential(
        &self,
        id: i64,
        request: &UpdateCredentialRequest,
    ) -> Result<EdaCredential, AppError> {
        let existing = self
            .get_credential(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("EdaCredential {} not found", id)))?;

        let now = Utc::now().to_rfc3339();
        let name = request.name.clone().unwrap_or(existing.name.clone());
        let description = match &request.description {
            Some(description) => description.clone(),
            None => existing.description.clone(),
        };
        let credential_type = request
            .credential_type
            .clone()
            .unwrap_or(existing.credential_type.clone());
        let inputs = match &request.inputs {
            Some(inputs) => inputs_to_store(inputs.clone(), Some(&existing.inputs)),
            None => existing.inputs.clone(),
        };

        sqlx::query(
            "UPDATE eda_credentials SET name = ?, description = ?, credential_type = ?, inputs = ?, modified_at = ? WHERE id = ?",
        )
        .bind(&name)
        .bind(&description)
        .bind(&credential_type)
        .bind(inputs.to_string())
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "EdaCredential", &name))?;

        Ok(EdaCredential {
            id,
            name,
            description,
            credential_type,
            inputs,
            managed: existing.managed,
            created_at: existing.created_at,
            modified_at: now,
        })
    }

    /// Delete a credential. Referencing projects have the reference cleared.
    pub async fn delete_credential(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM eda_credentials WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("EdaCredential {} not found", id)));
        }
        Ok(())
    }

    /// Resources that reference a credential.
    pub async fn credential_references(
        &self,
        id: i64,
    ) -> Result<Vec<CredentialReference>, AppError> {
        let rows = sqlx::query(
            "SELECT id, name FROM projects WHERE eda_credential_id = ? OR signature_validation_credential_id = ? ORDER BY id",
        )
        .bind(id)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let project_id: i64 = row.get("id");
                CredentialReference {
                    resource_type: "Project".to_string(),
                    id: project_id,
                    name: row.get("name"),
                    uri: format!("/api/projects/{}", project_id),
                }
            })
            .collect())
    }

    // ==================== PROJECT OPERATIONS ====================

    /// List projects, optionally filtered by a name substring.
    pub async fn list_projects(&self, name: Option<&str>) -> Result<Vec<Project>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM projects ORDER BY id",
            PROJECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(project_from_row)
            .filter(|p| name.map_or(true, |n| p.name.contains(n)))
            .collect())
    }

    /// Get a project by ID.
    pub async fn get_project(&self, id: i64) -> Result<Option<Project>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(project_from_row))
    }

    /// Create a new project in the pending state.
    pub async fn create_project(&self, request: &CreateProjectRequest) -> Result<Project, AppError> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"INSERT INTO projects (
                name, description, url, eda_credential_id, signature_validation_credential_id,
                verify_ssl, import_state, created_at, modified_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&request.name)
        .bind(&request.description)
        .bind(&request.url)
        .bind(request.eda_credential_id)
        .bind(request.signature_validation_credential_id)
        .bind(request.verify_ssl as i32)
        .bind(ImportState::Pending.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "Project", &request.name))?;

        Ok(Project {
            id: result.last_insert_rowid(),
            name: request.name.clone(),
            description: request.description.clone(),
            url: request.url.clone(),
            eda_credential_id: request.eda_credential_id,
            signature_validation_credential_id: request.signature_validation_credential_id,
            verify_ssl: request.verify_ssl,
            git_hash: None,
            import_state: ImportState::Pending,
            import_error: None,
            import_task_id: None,
            archive_file: None,
            created_at: now.clone(),
            modified_at: now,
        })
    }

    /// Record the job that imports a project.
    pub async fn set_import_task_id(&self, id: i64, task_id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE projects SET import_task_id = ? WHERE id = ?")
            .bind(task_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Apply a partial update to a project.
    pub async fn update_project(
        &self,
        id: i64,
        request: &UpdateProjectRequest,
    ) -> Result<Project, AppError> {
        let existing = self
            .get_project(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Project {} not found", id)))?;

        let now = Utc::now().to_rfc3339();
        let name = request.name.clone().unwrap_or(existing.name.clone());
        let description = match &request.description {
            Some(description) => description.clone(),
            None => existing.description.clone(),
        };
        let eda_credential_id = request
            .eda_credential_id
            .unwrap_or(existing.eda_credential_id);
        let signature_validation_credential_id = request
            .signature_validation_credential_id
            .unwrap_or(existing.signature_validation_credential_id);
        let verify_ssl = request.verify_ssl.unwrap_or(existing.verify_ssl);

        sqlx::query(
            r#"UPDATE projects SET
                name = ?, description = ?, eda_credential_id = ?,
                signature_validation_credential_id = ?, verify_ssl = ?, modified_at = ?
            WHERE id = ?"#,
        )
        .bind(&name)
        .bind(&description)
        .bind(eda_credential_id)
        .bind(signature_validation_credential_id)
        .bind(verify_ssl as i32)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "Project", &name))?;

        Ok(Project {
            name,
            description,
            eda_credential_id,
            signature_validation_credential_id,
            verify_ssl,
            modified_at: now,
            ..existing
        })
    }

    /// Delete a project and its rulebooks, returning the deleted row.
    pub async fn delete_project(&self, id: i64) -> Result<Project, AppError> {
        let existing = self
            .get_project(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Project {} not found", id)))?;

        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(existing)
    }

    /// Move a project back to pending for a new sync run.
    ///
    /// The check and the state change happen in one conditional UPDATE so two
    /// concurrent requests can never both be admitted.
    pub async fn request_project_sync(&self, id: i64, task_id: &str) -> Result<Project, AppError> {
        let result = sqlx::query(
            r#"UPDATE projects
               SET import_state = ?, import_task_id = ?, import_error = NULL, modified_at = ?
               WHERE id = ? AND import_state NOT IN (?, ?)"#,
        )
        .bind(ImportState::Pending.as_str())
        .bind(task_id)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .bind(ImportState::Pending.as_str())
        .bind(ImportState::Running.as_str())
        .execute(&self.pool)
        .await?;

        let project = self
            .get_project(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Project {} not found", id)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(
                "Project import or sync is already running.".to_string(),
            ));
        }

        Ok(project)
    }

    /// Fail runs that were pending or running when the process stopped.
    ///
    /// Jobs live on the in-process runtime, so nothing will ever finish them.
    pub async fn fail_interrupted_imports(&self) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE projects SET import_state = ?, import_error = ?, modified_at = ? WHERE import_state IN (?, ?)",
        )
        .bind(ImportState::Failed.as_str())
        .bind("Import was interrupted by a server restart.")
        .bind(Utc::now().to_rfc3339())
        .bind(ImportState::Pending.as_str())
        .bind(ImportState::Running.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ==================== RULEBOOK OPERATIONS ====================

    /// List a project's rulebooks with their ruleset and rule trees.
    pub async fn list_rulebook_details(
        &self,
        project_id: i64,
    ) -> Result<Vec<RulebookDetail>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let mut details = Vec::new();

        for rulebook in imports::list_project_rulebooks(&mut *conn, project_id).await? {
            let mut ruleset_details = Vec::new();
            for ruleset in imports::list_rulesets(&mut *conn, rulebook.id).await? {
                let rules = imports::list_rules(&mut *conn, ruleset.id).await?;
                ruleset_details.push(RulesetDetail { ruleset, rules });
            }
            details.push(RulebookDetail {
                rulebook,
                ruleset_details,
            });
        }

        Ok(details)
    }
}

/// Map a unique-constraint violation to a conflict error.
fn unique_conflict(err: sqlx::Error, resource: &str, name: &str) -> AppError {
    let is_unique = err
        .as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false);

    if is_unique {
        AppError::Conflict(format!("{} with name {} already exists", resource, name))
    } else {
        AppError::from(err)
    }
}

// Helper functions for row conversion

pub(super) fn credential_from_row(row: &sqlx::sqlite::SqliteRow) -> EdaCredential {
    let managed: i32 = row.get("managed");
    let inputs: String = row.get("inputs");
    EdaCredential {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        credential_type: row.get("credential_type"),
        inputs: serde_json::from_str(&inputs).unwrap_or_default(),
        managed: managed != 0,
        created_at: row.get("created_at"),
        modified_at: row.get("modified_at"),
    }
}

pub(super) fn project_from_row(row: &sqlx::sqlite::SqliteRow) -> Project {
    let verify_ssl: i32 = row.get("verify_ssl");
    let import_state: String = row.get("import_state");
    Project {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        url: row.get("url"),
        eda_credential_id: row.get("eda_credential_id"),
        signature_validation_credential_id: row.get("signature_validation_credential_id"),
        verify_ssl: verify_ssl != 0,
        git_hash: row.get("git_hash"),
        import_state: ImportState::from_str(&import_state).unwrap_or(ImportState::Pending),
        import_error: row.get("import_error"),
        import_task_id: row.get("import_task_id"),
        archive_file: row.get("archive_file"),
        created_at: row.get("created_at"),
        modified_at: row.get("modified_at"),
    }
}
