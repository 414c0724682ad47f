//! Confirmation gate for destructive operations
//!
//! Two separate rules:
//! - manual ID entry: the user types a confirmation phrase that must match
//!   the configured literal (case-insensitive);
//! - IDs from the batch: each record carries its own confirmation field,
//!   accepted when it is `true`, `"true"`, `"yes"` or `"delete"`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ClassifiedError;

/// Keywords accepted in a record's confirmation field
const FIELD_CONFIRMATION_WORDS: [&str; 3] = ["true", "yes", "delete"];

/// Where the ID of the item to delete comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdSource {
    /// Typed once into the node
    #[default]
    Manual,
    /// Read from each input record
    Field,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "default_require_confirmation")]
    pub require_confirmation: bool,

    #[serde(default)]
    pub id_source: IdSource,

    /// Literal the user must type for manual deletes
    #[serde(default = "default_confirmation_text")]
    pub confirmation_text: String,

    /// What the user actually typed
    #[serde(default)]
    pub typed_confirmation: Option<String>,

    /// Record field checked for batch deletes
    #[serde(default = "default_confirmation_field")]
    pub confirmation_field: String,
}

fn default_require_confirmation() -> bool {
    true
}
fn default_confirmation_text() -> String {
    "delete".to_string()
}
fn default_confirmation_field() -> String {
    "confirm_delete".to_string()
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            require_confirmation: default_require_confirmation(),
            id_source: IdSource::default(),
            confirmation_text: default_confirmation_text(),
            typed_confirmation: None,
            confirmation_field: default_confirmation_field(),
        }
    }
}

impl ConfirmationConfig {
    /// No confirmation at all
    pub fn disabled() -> Self {
        Self {
            require_confirmation: false,
            ..Default::default()
        }
    }

    pub fn manual(typed: impl Into<String>) -> Self {
        Self {
            typed_confirmation: Some(typed.into()),
            ..Default::default()
        }
    }

    pub fn field(name: impl Into<String>) -> Self {
        Self {
            id_source: IdSource::Field,
            confirmation_field: name.into(),
            ..Default::default()
        }
    }
}

pub fn is_confirmed(config: &ConfirmationConfig, record: &Map<String, Value>) -> bool {
    if !config.require_confirmation {
        return true;
    }
    match config.id_source {
        IdSource::Manual => manual_phrase_matches(config),
        IdSource::Field => record
            .get(&config.confirmation_field)
            .is_some_and(field_value_confirms),
    }
}

fn manual_phrase_matches(config: &ConfirmationConfig) -> bool {
    config
        .typed_confirmation
        .as_deref()
        .is_some_and(|typed| {
            typed.trim().to_lowercase() == config.confirmation_text.trim().to_lowercase()
        })
}

fn field_value_confirms(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => {
            let text = text.trim();
            FIELD_CONFIRMATION_WORDS
                .iter()
                .any(|word| text.eq_ignore_ascii_case(word))
        }
        _ => false,
    }
}

/// Gate a delete: `Ok(())` when confirmed, `CONFIRMATION_REQUIRED` otherwise.
pub fn ensure_confirmed(
    config: &ConfirmationConfig,
    record: &Map<String, Value>,
) -> Result<(), ClassifiedError> {
    if is_confirmed(config, record) {
        return Ok(());
    }
    let message = match config.id_source {
        IdSource::Manual => format!(
            "Delete not confirmed. Type '{}' in the confirmation field to proceed.",
            config.confirmation_text
        ),
        IdSource::Field => format!(
            "Delete not confirmed. Set '{}' to true, \"yes\" or \"delete\" on the record.",
            config.confirmation_field
        ),
    };
    Err(ClassifiedError::confirmation_required(message))
}
