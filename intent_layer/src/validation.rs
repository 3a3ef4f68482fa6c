//! Schema validation of generated compositions
//!
//! Validation works on the serialized JSON payload, the same shape the
//! renderer receives.

use crate::types::UserIntent;
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One validation failure, addressed by a JSON path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// What a composition for one intent must contain
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionSchema {
    pub intent: UserIntent,
    /// Required props, one entry per component in order
    pub component_props: Vec<Vec<&'static str>>,
}

pub trait SchemaValidator: Send + Sync {
    fn validate(&self, schema: &CompositionSchema, value: &Value) -> Result<(), Vec<FieldError>>;
}

pub const LAYOUT_KINDS: &[&str] = &["single", "grid", "dashboard"];

/// Checks layout, query ids, component kinds, required props and bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralValidator;

impl SchemaValidator for StructuralValidator {
    fn validate(&self, schema: &CompositionSchema, value: &Value) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        match value.pointer("/layout/kind").and_then(Value::as_str) {
            Some(kind) if LAYOUT_KINDS.contains(&kind) => {}
            Some(kind) => errors.push(FieldError::new("layout.kind", format!("unknown layout `{kind}`"))),
            None => errors.push(FieldError::new("layout.kind", "missing layout kind")),
        }
        match value.pointer("/layout/columns").and_then(Value::as_u64) {
            Some(columns) if columns >= 1 => {}
            _ => errors.push(FieldError::new("layout.columns", "must be a positive integer")),
        }

        let mut query_ids = AHashSet::new();
        let queries = value
            .pointer("/data/queries")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for (idx, query) in queries.iter().enumerate() {
            match query.get("id").and_then(Value::as_str) {
                Some(id) if !id.is_empty() => {
                    if !query_ids.insert(id.to_string()) {
                        errors.push(FieldError::new(format!("data.queries[{idx}].id"), format!("duplicate query id `{id}`")));
                    }
                }
                _ => errors.push(FieldError::new(format!("data.queries[{idx}].id"), "missing query id")),
            }
            if query.get("source").and_then(Value::as_str).is_none() {
                errors.push(FieldError::new(format!("data.queries[{idx}].source"), "missing data source"));
            }
        }

        let components = value
            .get("components")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        if components.is_empty() {
            errors.push(FieldError::new("components", "composition has no components"));
        }
        if components.len() != schema.component_props.len() {
            errors.push(FieldError::new(
                "components",
                format!(
                    "expected {} components for `{}`, found {}",
                    schema.component_props.len(),
                    schema.intent,
                    components.len()
                ),
            ));
        }

        for (idx, component) in components.iter().enumerate() {
            match component.get("kind").and_then(Value::as_str) {
                Some(kind) if !kind.is_empty() => {}
                _ => errors.push(FieldError::new(format!("components[{idx}].kind"), "missing component kind")),
            }

            let props = component.get("props").and_then(Value::as_object);
            if props.is_none() {
                errors.push(FieldError::new(format!("components[{idx}].props"), "props must be an object"));
            }
            let required = schema.component_props.get(idx).map(Vec::as_slice).unwrap_or(&[]);
            for prop in required {
                let present = props
                    .and_then(|p| p.get(*prop))
                    .is_some_and(|v| !v.is_null());
                if !present {
                    errors.push(FieldError::new(format!("components[{idx}].props.{prop}"), "required prop is missing"));
                }
            }

            if let Some(binding) = component.get("data_binding") {
                match binding.as_str() {
                    Some(id) if query_ids.contains(id) => {}
                    _ => errors.push(FieldError::new(
                        format!("components[{idx}].data_binding"),
                        format!("binding {binding} does not name a query"),
                    )),
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
