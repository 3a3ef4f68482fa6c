//! Tunable weights and lifetimes for the assistant.
//!
//! Every field has a default, so an empty TOML document is a valid config.
//!
//! ```toml
//! [classifier]
//! keyword_weight = 0.6
//! entity_boost = 0.15
//!
//! [context]
//! idle_timeout_secs = 900
//! ```

use crate::error::{IntentError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub recognizer: RecognizerConfig,

    #[serde(default)]
    pub context: ContextConfig,
}

/// Scoring weights for the intent classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Weight of the keyword coverage ratio in the base score
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,

    /// Added once per cue entity type present in the utterance
    #[serde(default = "default_entity_boost")]
    pub entity_boost: f64,

    /// Added when one of the intent's phrase templates matches
    #[serde(default = "default_phrase_boost")]
    pub phrase_boost: f64,

    /// Subtracted when a disqualifying keyword is present
    #[serde(default = "default_disqualifier_penalty")]
    pub disqualifier_penalty: f64,

    /// Fixed confidence of the `Unknown` floor candidate
    #[serde(default = "default_unknown_floor")]
    pub unknown_floor: f64,

    /// Added to the pending intent(s) when the follow-up is terse
    #[serde(default = "default_pending_bias")]
    pub pending_bias: f64,

    /// Utterances with at most this many content tokens count as terse
    #[serde(default = "default_terse_token_limit")]
    pub terse_token_limit: usize,

    /// Minimum sequence ratio for a misspelled token to match a keyword
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
}

fn default_keyword_weight() -> f64 {
    0.6
}
fn default_entity_boost() -> f64 {
    0.15
}
fn default_phrase_boost() -> f64 {
    0.1
}
fn default_disqualifier_penalty() -> f64 {
    0.2
}
fn default_unknown_floor() -> f64 {
    0.25
}
fn default_pending_bias() -> f64 {
    0.5
}
fn default_terse_token_limit() -> usize {
    2
}
fn default_fuzzy_threshold() -> f64 {
    0.85
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            keyword_weight: default_keyword_weight(),
            entity_boost: default_entity_boost(),
            phrase_boost: default_phrase_boost(),
            disqualifier_penalty: default_disqualifier_penalty(),
            unknown_floor: default_unknown_floor(),
            pending_bias: default_pending_bias(),
            terse_token_limit: default_terse_token_limit(),
            fuzzy_threshold: default_fuzzy_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// Two top candidates closer than this are reported as ambiguous
    #[serde(default = "default_ambiguity_margin")]
    pub ambiguity_margin: f64,
}

fn default_ambiguity_margin() -> f64 {
    0.05
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            ambiguity_margin: default_ambiguity_margin(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Oldest turns are dropped past this length
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

fn default_idle_timeout_secs() -> u64 {
    1800
}
fn default_max_turns() -> usize {
    20
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            max_turns: default_max_turns(),
        }
    }
}

impl ContextConfig {
    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.idle_timeout_secs.min(i64::MAX as u64) as i64)
    }
}

impl AssistantConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: AssistantConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Reject weights that would break the 0..1 confidence contract.
    pub fn validate(&self) -> Result<()> {
        let c = &self.classifier;
        let unit_interval = [
            ("classifier.keyword_weight", c.keyword_weight),
            ("classifier.entity_boost", c.entity_boost),
            ("classifier.phrase_boost", c.phrase_boost),
            ("classifier.disqualifier_penalty", c.disqualifier_penalty),
            ("classifier.unknown_floor", c.unknown_floor),
            ("classifier.pending_bias", c.pending_bias),
            ("classifier.fuzzy_threshold", c.fuzzy_threshold),
            ("recognizer.ambiguity_margin", self.recognizer.ambiguity_margin),
        ];
        for (name, value) in unit_interval {
            if !(0.0..=1.0).contains(&value) {
                return Err(IntentError::Config(format!(
                    "{name} must be within 0..=1, got {value}"
                )));
            }
        }
        if self.context.max_turns == 0 {
            return Err(IntentError::Config(
                "context.max_turns must be at least 1".to_string(),
            ));
        }
        if self.context.idle_timeout_secs == 0 {
            return Err(IntentError::Config(
                "context.idle_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
