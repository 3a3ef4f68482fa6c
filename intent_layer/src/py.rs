//! Python bindings for the intent layer using PyO3

use crate::config::AssistantConfig;
use crate::entities::EntityExtractor;
use crate::orchestrator::AssistantOrchestrator;
use crate::recognizer::IntentRecognizer;
use crate::similarity::calculate_similarity;
use chrono::{DateTime, Utc};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

fn value_error(err: impl std::fmt::Display) -> PyErr {
    PyErr::new::<PyValueError, _>(err.to_string())
}

/// Calculate similarity between two strings (Python function)
#[pyfunction]
pub fn py_calculate_similarity(input: &str, pattern: &str) -> f64 {
    calculate_similarity(input, pattern)
}

/// Python wrapper for entity extractor
#[pyclass]
pub struct PyEntityExtractor {
    extractor: EntityExtractor,
}

#[pymethods]
impl PyEntityExtractor {
    #[new]
    fn new() -> Self {
        Self {
            extractor: EntityExtractor::new(),
        }
    }

    /// Extract entities from text
    fn extract<'py>(&self, text: &str, py: Python<'py>) -> PyResult<Vec<Bound<'py, PyDict>>> {
        self.extractor
            .extract(text)
            .iter()
            .map(|e| -> PyResult<Bound<'py, PyDict>> {
                let dict = PyDict::new_bound(py);
                dict.set_item("type", e.entity_type.as_str())?;
                dict.set_item("value", e.text())?;
                dict.set_item("original", &e.original)?;
                dict.set_item("start", e.span.start)?;
                dict.set_item("end", e.span.end)?;
                dict.set_item("confidence", e.confidence)?;
                if let Some(unit) = e.quantity().and_then(|q| q.unit) {
                    dict.set_item("unit", unit.as_str())?;
                }
                Ok(dict)
            })
            .collect()
    }
}

/// Python wrapper for the recognizer
#[pyclass]
pub struct PyIntentRecognizer {
    recognizer: IntentRecognizer,
}

#[pymethods]
impl PyIntentRecognizer {
    #[new]
    fn new() -> Self {
        Self {
            recognizer: IntentRecognizer::default(),
        }
    }

    /// Recognize intent and entities in `text`
    fn recognize<'py>(&self, text: &str, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let result = self.recognizer.recognize(text);

        let dict = PyDict::new_bound(py);
        dict.set_item("intent", result.intent.as_str())?;
        dict.set_item("confidence", result.confidence)?;

        let alternatives: Vec<Bound<'_, PyDict>> = result
            .alternatives
            .iter()
            .map(|c| -> PyResult<Bound<'_, PyDict>> {
                let alt = PyDict::new_bound(py);
                alt.set_item("intent", c.intent.as_str())?;
                alt.set_item("confidence", c.confidence)?;
                Ok(alt)
            })
            .collect::<PyResult<Vec<_>>>()?;
        dict.set_item("alternatives", alternatives)?;

        let entities_json = serde_json::to_string(&result.entities).map_err(value_error)?;
        dict.set_item("entities", entities_json)?;
        Ok(dict)
    }
}

/// Python wrapper for the full assistant
#[pyclass]
pub struct PyAssistant {
    orchestrator: AssistantOrchestrator,
}

#[pymethods]
impl PyAssistant {
    /// Build with defaults, or from a TOML config string
    #[new]
    #[pyo3(signature = (config_toml=None))]
    fn new(config_toml: Option<&str>) -> PyResult<Self> {
        let config = match config_toml {
            Some(raw) => AssistantConfig::from_toml_str(raw).map_err(value_error)?,
            None => AssistantConfig::default(),
        };
        let orchestrator = AssistantOrchestrator::from_config(&config).map_err(value_error)?;
        Ok(Self { orchestrator })
    }

    /// Handle one utterance; returns the response as a JSON string.
    ///
    /// `now` is a unix timestamp in seconds and defaults to the current time.
    #[pyo3(signature = (session_id, utterance, now=None))]
    fn handle(&self, session_id: &str, utterance: &str, now: Option<i64>) -> PyResult<String> {
        let now = match now {
            Some(secs) => DateTime::<Utc>::from_timestamp(secs, 0)
                .ok_or_else(|| value_error(format!("timestamp out of range: {secs}")))?,
            None => Utc::now(),
        };
        let response = self.orchestrator.handle(session_id, utterance, now);
        serde_json::to_string(&response).map_err(value_error)
    }

    /// Forget a session
    fn end_session(&self, session_id: &str) -> bool {
        self.orchestrator.end_session(session_id)
    }

    /// Evict idle sessions; returns how many were dropped
    fn sweep(&self) -> usize {
        self.orchestrator.sweep(Utc::now())
    }

    /// Number of live sessions
    fn sessions(&self) -> usize {
        self.orchestrator.store().len()
    }
}
