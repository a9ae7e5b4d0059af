//! Rulebook, ruleset and rule models produced by project import.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A rulebook file discovered in a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rulebook {
    pub id: i64,
    pub project_id: i64,
    /// Directory of the file relative to the checkout root
    pub path: String,
    /// File name
    pub name: String,
    /// Verbatim file content, used for change detection
    pub rulesets: String,
    pub created_at: String,
    pub modified_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ruleset {
    pub id: i64,
    pub rulebook_id: i64,
    pub name: String,
    pub sources: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub ruleset_id: i64,
    pub name: String,
    pub action: Value,
}

/// A ruleset with its rules.
#[derive(Debug, Clone, Serialize)]
pub struct RulesetDetail {
    #[serde(flatten)]
    pub ruleset: Ruleset,
    pub rules: Vec<Rule>,
}

/// A rulebook with its parsed ruleset tree.
#[derive(Debug, Clone, Serialize)]
pub struct RulebookDetail {
    #[serde(flatten)]
    pub rulebook: Rulebook,
    pub ruleset_details: Vec<RulesetDetail>,
}
