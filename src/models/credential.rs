//! EDA credential model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::deserialize_some;

/// Placeholder rendered in place of secret input values.
pub const ENCRYPTED_STRING: &str = "$encrypted$";

/// Input keys whose values are never returned in clear text.
pub const SECRET_FIELDS: &[&str] = &[
    "password",
    "token",
    "ssh_key_data",
    "ssh_key_unlock",
    "vault_password",
    "secret",
];

/// A credential that projects and activations can reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdaCredential {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Kind of the credential type, e.g. `scm` or `registry`
    pub credential_type: String,
    /// Opaque input values; secrets are masked on output
    pub inputs: Value,
    /// System-owned credentials are hidden from listings and cannot be deleted
    pub managed: bool,
    pub created_at: String,
    pub modified_at: String,
}

impl EdaCredential {
    /// Return a copy safe to render in API responses.
    pub fn masked(&self) -> Self {
        let mut credential = self.clone();
        if let Value::Object(map) = &mut credential.inputs {
            for (key, value) in map.iter_mut() {
                if SECRET_FIELDS.contains(&key.as_str()) && !value.is_null() {
                    *value = Value::String(ENCRYPTED_STRING.to_string());
                }
            }
        }
        credential
    }

    /// Look up a string input value.
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).and_then(Value::as_str)
    }
}

/// Merge submitted inputs with the stored ones.
///
/// Secret values submitted as the `$encrypted$` placeholder keep the stored value.
pub fn inputs_to_store(inputs: Value, existing: Option<&Value>) -> Value {
    let (Value::Object(mut submitted), Some(Value::Object(stored))) = (inputs.clone(), existing)
    else {
        return inputs;
    };

    for (key, value) in submitted.iter_mut() {
        if value.as_str() == Some(ENCRYPTED_STRING) {
            if let Some(previous) = stored.get(key) {
                *value = previous.clone();
            }
        }
    }
    Value::Object(submitted)
}

/// A resource referencing a credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialReference {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: i64,
    pub name: String,
    pub uri: String,
}

/// Credential as rendered by the retrieve endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EdaCredentialDetail {
    #[serde(flatten)]
    pub credential: EdaCredential,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<CredentialReference>>,
}

/// Request body for creating a new credential.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCredentialRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub credential_type: String,
    #[serde(default = "empty_inputs")]
    pub inputs: Value,
}

fn empty_inputs() -> Value {
    Value::Object(Default::default())
}

/// Request body for a partial credential update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCredentialRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// `null` clears the description
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub credential_type: Option<String>,
    #[serde(default)]
    pub inputs: Option<Value>,
}

/// Query parameters accepted by the credential list endpoint.
#[derive(Debug, Clone, Default)]
pub struct CredentialFilter {
    pub name: Option<String>,
    pub kinds: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn credential(inputs: Value) -> EdaCredential {
        EdaCredential {
            id: 1,
            name: "scm".to_string(),
            description: None,
            credential_type: "scm".to_string(),
            inputs,
            managed: false,
            created_at: String::new(),
            modified_at: String::new(),
        }
    }

    #[test]
    fn test_masked_hides_secrets_only() {
        let masked = credential(json!({"username": "bob", "password": "hunter2"})).masked();
        assert_eq!(masked.inputs["username"], "bob");
        assert_eq!(masked.inputs["password"], ENCRYPTED_STRING);
    }

    #[test]
    fn test_inputs_to_store_keeps_placeholder_secrets() {
        let stored = json!({"username": "bob", "password": "hunter2"});
        let merged = inputs_to_store(
            json!({"username": "alice", "password": ENCRYPTED_STRING}),
            Some(&stored),
        );
        assert_eq!(merged, json!({"username": "alice", "password": "hunter2"}));
    }

    #[test]
    fn test_inputs_to_store_without_existing() {
        let inputs = json!({"token": "abc"});
        assert_eq!(inputs_to_store(inputs.clone(), None), inputs);
    }

    #[test]
    fn test_update_request_null_description_clears() {
        let cleared: UpdateCredentialRequest =
            serde_json::from_value(json!({"description": null})).unwrap();
        assert_eq!(cleared.description, Some(None));

        let omitted: UpdateCredentialRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(omitted.description, None);
    }
}
