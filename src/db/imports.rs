//! Persistence used by project import and sync runs.
//!
//! Every function takes a connection so callers can run them on an open
//! transaction (`&mut *tx`).

use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqliteConnection};

use super::repository::{
    credential_from_row, project_from_row, CREDENTIAL_COLUMNS, PROJECT_COLUMNS,
};
use crate::models::{EdaCredential, Project, Rule, Rulebook, Ruleset};

pub async fn load_project(
    conn: &mut SqliteConnection,
    project_id: i64,
) -> Result<Option<Project>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS))
        .bind(project_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.as_ref().map(project_from_row))
}

pub async fn load_credential(
    conn: &mut SqliteConnection,
    credential_id: i64,
) -> Result<Option<EdaCredential>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM eda_credentials WHERE id = ?",
        CREDENTIAL_COLUMNS
    ))
    .bind(credential_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.as_ref().map(credential_from_row))
}

pub async fn insert_rulebook(
    conn: &mut SqliteConnection,
    project_id: i64,
    path: &str,
    name: &str,
    rulesets: &str,
) -> Result<i64, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        "INSERT INTO rulebooks (project_id, path, name, rulesets, created_at, modified_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(project_id)
    .bind(path)
    .bind(name)
    .bind(rulesets)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn insert_ruleset(
    conn: &mut SqliteConnection,
    rulebook_id: i64,
    name: &str,
    sources: &Value,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query("INSERT INTO rulesets (rulebook_id, name, sources) VALUES (?, ?, ?)")
        .bind(rulebook_id)
        .bind(name)
        .bind(sources.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(result.last_insert_rowid())
}

pub async fn insert_rule(
    conn: &mut SqliteConnection,
    ruleset_id: i64,
    name: &str,
    action: &Value,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query("INSERT INTO rules (ruleset_id, name, action) VALUES (?, ?, ?)")
        .bind(ruleset_id)
        .bind(name)
        .bind(action.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(result.last_insert_rowid())
}

/// List the rulebooks of a project ordered by id.
pub async fn list_project_rulebooks(
    conn: &mut SqliteConnection,
    project_id: i64,
) -> Result<Vec<Rulebook>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, project_id, path, name, rulesets, created_at, modified_at FROM rulebooks WHERE project_id = ? ORDER BY id",
    )
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.iter().map(rulebook_from_row).collect())
}

pub async fn list_rulesets(
    conn: &mut SqliteConnection,
    rulebook_id: i64,
) -> Result<Vec<Ruleset>, sqlx::Error> {
    let rows =
        sqlx::query("SELECT id, rulebook_id, name, sources FROM rulesets WHERE rulebook_id = ? ORDER BY id")
            .bind(rulebook_id)
            .fetch_all(&mut *conn)
            .await?;

    Ok(rows.iter().map(ruleset_from_row).collect())
}

pub async fn list_rules(
    conn: &mut SqliteConnection,
    ruleset_id: i64,
) -> Result<Vec<Rule>, sqlx::Error> {
    let rows =
        sqlx::query("SELECT id, ruleset_id, name, action FROM rules WHERE ruleset_id = ? ORDER BY id")
            .bind(ruleset_id)
            .fetch_all(&mut *conn)
            .await?;

    Ok(rows.iter().map(rule_from_row).collect())
}

/// Overwrite the stored raw text of a rulebook.
pub async fn update_rulebook_rulesets(
    conn: &mut SqliteConnection,
    rulebook_id: i64,
    rulesets: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE rulebooks SET rulesets = ?, modified_at = ? WHERE id = ?")
        .bind(rulesets)
        .bind(Utc::now().to_rfc3339())
        .bind(rulebook_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Remove all rulesets of a rulebook; rules cascade.
pub async fn delete_rulesets(
    conn: &mut SqliteConnection,
    rulebook_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM rulesets WHERE rulebook_id = ?")
        .bind(rulebook_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_rulebooks(
    conn: &mut SqliteConnection,
    rulebook_ids: &[i64],
) -> Result<u64, sqlx::Error> {
    let mut deleted = 0;
    for id in rulebook_ids {
        let result = sqlx::query("DELETE FROM rulebooks WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        deleted += result.rows_affected();
    }
    Ok(deleted)
}

/// Refresh the rulebook text cached on activations of a rulebook.
pub async fn update_activation_rulesets(
    conn: &mut SqliteConnection,
    rulebook_id: i64,
    rulesets: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE activations SET rulebook_rulesets = ? WHERE rulebook_id = ?")
        .bind(rulesets)
        .bind(rulebook_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Persist only the import state and error of a project.
pub async fn save_import_state(
    conn: &mut SqliteConnection,
    project: &Project,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE projects SET import_state = ?, import_error = ?, modified_at = ? WHERE id = ?")
        .bind(project.import_state.as_str())
        .bind(&project.import_error)
        .bind(Utc::now().to_rfc3339())
        .bind(project.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Persist the import-owned columns of a project.
///
/// `import_task_id` is owned by the dispatcher and is left untouched.
pub async fn save_project_import(
    conn: &mut SqliteConnection,
    project: &Project,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE projects SET git_hash = ?, import_state = ?, import_error = ?, archive_file = ?, modified_at = ? WHERE id = ?",
    )
    .bind(&project.git_hash)
    .bind(project.import_state.as_str())
    .bind(&project.import_error)
    .bind(&project.archive_file)
    .bind(Utc::now().to_rfc3339())
    .bind(project.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn rulebook_from_row(row: &sqlx::sqlite::SqliteRow) -> Rulebook {
    Rulebook {
        id: row.get("id"),
        project_id: row.get("project_id"),
        path: row.get("path"),
        name: row.get("name"),
        rulesets: row.get("rulesets"),
        created_at: row.get("created_at"),
        modified_at: row.get("modified_at"),
    }
}

fn ruleset_from_row(row: &sqlx::sqlite::SqliteRow) -> Ruleset {
    let sources: String = row.get("sources");
    Ruleset {
        id: row.get("id"),
        rulebook_id: row.get("rulebook_id"),
        name: row.get("name"),
        sources: parse_json(&sources),
    }
}

fn rule_from_row(row: &sqlx::sqlite::SqliteRow) -> Rule {
    let action: String = row.get("action");
    Rule {
        id: row.get("id"),
        ruleset_id: row.get("ruleset_id"),
        name: row.get("name"),
        action: parse_json(&action),
    }
}

fn parse_json(s: &str) -> Value {
    serde_json::from_str(s).unwrap_or(Value::Null)
}
