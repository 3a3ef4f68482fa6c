//! Intent layer - natural language to dashboard compositions
//!
//! This crate turns an operator's utterance into either a renderable
//! component composition or a clarifying question, keeping per-session
//! conversation memory between turns.

pub mod types;
pub mod similarity;
pub mod entities;
pub mod registry;
pub mod classifier;
pub mod recognizer;
pub mod context;
pub mod semantic;
pub mod validation;
pub mod composition;
pub mod orchestrator;
pub mod config;
pub mod error;

pub use types::*;
pub use entities::EntityExtractor;
pub use registry::{IntentRegistry, IntentSpec, SlotRequirement};
pub use classifier::IntentClassifier;
pub use recognizer::IntentRecognizer;
pub use context::{ContextStore, DialogState, IntentContext};
pub use semantic::{BusinessSemantics, HvacSemantics};
pub use validation::{CompositionSchema, FieldError, SchemaValidator, StructuralValidator};
pub use composition::{
    ClarificationReason, ClarificationRequest, ComponentComposition, ComponentSpec,
    CompositionGenerator, DataQuery, GenerationOutcome, LayoutConfig, LayoutKind,
};
pub use orchestrator::{AssistantOrchestrator, AssistantResponse};
pub use config::AssistantConfig;
pub use error::{IntentError, Result};

// Python bindings
#[cfg(feature = "extension-module")]
pub mod py;

#[cfg(feature = "extension-module")]
use pyo3::prelude::*;

#[cfg(feature = "extension-module")]
#[pymodule]
fn intent_layer(m: &Bound<'_, PyModule>) -> PyResult<()> {
    use py::*;
    m.add_class::<PyEntityExtractor>()?;
    m.add_class::<PyIntentRecognizer>()?;
    m.add_class::<PyAssistant>()?;
    m.add_function(wrap_pyfunction!(py_calculate_similarity, m)?)?;
    Ok(())
}
