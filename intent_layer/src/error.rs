//! Error types for the intent layer.
//!
//! Recognition never fails; it degrades to `Unknown`. Everything here is
//! either a host-side failure (config, IO, serialization) or a misconfigured
//! intent registry, which must surface as an internal fault.

use crate::types::{EntityType, UserIntent};
use crate::validation::FieldError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("no composition template registered for intent `{0}`")]
    MissingTemplate(UserIntent),

    #[error("composition for `{intent}` failed schema validation: {}", format_field_errors(.errors))]
    SchemaViolation {
        intent: UserIntent,
        errors: Vec<FieldError>,
    },

    #[error("intent `{intent}` requires slot `{slot}` which no extractor produces")]
    UnproducibleSlot { intent: UserIntent, slot: EntityType },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntentError {
    /// True for faults caused by the intent/slot/template tables themselves.
    pub fn is_internal_configuration(&self) -> bool {
        matches!(
            self,
            IntentError::MissingTemplate(_)
                | IntentError::SchemaViolation { .. }
                | IntentError::UnproducibleSlot { .. }
        )
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, IntentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_violation_message_lists_fields() {
        let err = IntentError::SchemaViolation {
            intent: UserIntent::ShowChart,
            errors: vec![
                FieldError::new("components[0].props.range", "required prop is missing"),
                FieldError::new("layout.kind", "unknown layout"),
            ],
        };
        let message = err.to_string();
        assert!(message.contains("show_chart"));
        assert!(message.contains("components[0].props.range: required prop is missing"));
        assert!(message.contains("layout.kind: unknown layout"));
        assert!(err.is_internal_configuration());
    }

    #[test]
    fn test_host_errors_are_not_configuration_faults() {
        assert!(!IntentError::Config("bad weight".into()).is_internal_configuration());
    }
}
