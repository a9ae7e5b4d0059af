//! Applying scanned rulebooks to the database.
//!
//! All functions run on the caller's connection, normally an open
//! transaction owned by the import service.

use std::collections::HashMap;

use serde_json::Value as JsonValue;
use serde_yaml::Value;
use sqlx::SqliteConnection;
use tracing::debug;

use super::{ImportError, RulebookInfo};
use crate::db::imports;
use crate::models::Rulebook;

/// Outcome counters of a sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
}

/// Create a rulebook row for every scanned file.
pub async fn import_rulebooks(
    conn: &mut SqliteConnection,
    project_id: i64,
    rulebooks: impl Iterator<Item = RulebookInfo>,
) -> Result<usize, ImportError> {
    let mut created = 0;
    for info in rulebooks {
        import_rulebook(conn, project_id, &info).await?;
        created += 1;
    }
    Ok(created)
}

/// Reconcile the project's rulebooks with a fresh scan.
///
/// Existing rulebooks are matched by file name only, so a file moved to
/// another directory updates the old row and a renamed file is a delete plus
/// a create.
pub async fn sync_rulebooks(
    conn: &mut SqliteConnection,
    project_id: i64,
    rulebooks: impl Iterator<Item = RulebookInfo>,
) -> Result<SyncSummary, ImportError> {
    let mut existing: HashMap<String, Rulebook> = imports::list_project_rulebooks(conn, project_id)
        .await?
        .into_iter()
        .map(|rulebook| (rulebook.name.clone(), rulebook))
        .collect();

    let mut summary = SyncSummary::default();
    for info in rulebooks {
        let (_dir, filename) = info.split_relpath();
        match existing.remove(&filename) {
            None => {
                import_rulebook(conn, project_id, &info).await?;
                summary.created += 1;
            }
            Some(rulebook) => {
                if sync_rulebook(conn, &rulebook, &info).await? {
                    summary.updated += 1;
                } else {
                    summary.unchanged += 1;
                }
            }
        }
    }

    let stale: Vec<i64> = existing.values().map(|rulebook| rulebook.id).collect();
    summary.deleted = imports::delete_rulebooks(conn, &stale).await? as usize;

    Ok(summary)
}

/// Insert one rulebook with its ruleset tree.
pub async fn import_rulebook(
    conn: &mut SqliteConnection,
    project_id: i64,
    info: &RulebookInfo,
) -> Result<i64, ImportError> {
    let (path, name) = info.split_relpath();
    let rulebook_id =
        imports::insert_rulebook(conn, project_id, &path, &name, &info.raw_content).await?;
    insert_rulebook_related_data(conn, rulebook_id, info).await?;

    debug!(rulebook_id, path = %info.relpath.display(), "Imported rulebook");
    Ok(rulebook_id)
}

/// Bring an existing rulebook up to date. Returns whether anything changed.
async fn sync_rulebook(
    conn: &mut SqliteConnection,
    rulebook: &Rulebook,
    info: &RulebookInfo,
) -> Result<bool, ImportError> {
    if rulebook.rulesets == info.raw_content {
        return Ok(false);
    }

    imports::update_rulebook_rulesets(conn, rulebook.id, &info.raw_content).await?;
    imports::delete_rulesets(conn, rulebook.id).await?;
    insert_rulebook_related_data(conn, rulebook.id, info).await?;
    let activations =
        imports::update_activation_rulesets(conn, rulebook.id, &info.raw_content).await?;

    debug!(
        rulebook_id = rulebook.id,
        activations, "Updated rulebook {}", rulebook.name
    );
    Ok(true)
}

/// Insert the rulesets and rules declared by a parsed rulebook.
async fn insert_rulebook_related_data(
    conn: &mut SqliteConnection,
    rulebook_id: i64,
    info: &RulebookInfo,
) -> Result<(), ImportError> {
    let Some(rulesets) = info.content.as_sequence() else {
        return Ok(());
    };

    for ruleset in rulesets {
        let sources = match ruleset.get("sources") {
            Some(sources) if !sources.is_null() => to_json(sources, info)?,
            _ => JsonValue::Array(Vec::new()),
        };
        let ruleset_id =
            imports::insert_ruleset(conn, rulebook_id, &name_of(ruleset), &sources).await?;

        let rules = ruleset
            .get("rules")
            .and_then(Value::as_sequence)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for rule in rules {
            let action = rule_action(rule, info)?;
            imports::insert_rule(conn, ruleset_id, &name_of(rule), &action).await?;
        }
    }

    Ok(())
}

/// The `name` key as text. Numbers and booleans keep their YAML spelling.
fn name_of(value: &Value) -> String {
    match value.get("name") {
        Some(Value::String(name)) => name.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// The rule's `action`, falling back to its `actions` list.
fn rule_action(rule: &Value, info: &RulebookInfo) -> Result<JsonValue, ImportError> {
    match rule.get("action").or_else(|| rule.get("actions")) {
        Some(action) => to_json(action, info),
        None => Ok(JsonValue::Object(Default::default())),
    }
}

fn to_json(value: &Value, info: &RulebookInfo) -> Result<JsonValue, ImportError> {
    serde_json::to_value(value).map_err(|err| ImportError::InvalidContent {
        path: info.relpath.display().to_string(),
        message: err.to_string(),
    })
}
