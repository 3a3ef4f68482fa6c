//! Intent classifier - ranks registered intents against an utterance
//!
//! Score per intent:
//!
//! ```text
//! keyword_weight * (matched content tokens / content tokens)
//!   + entity_boost * (cue entity types present)
//!   + phrase_boost            if a phrase template matches
//!   - disqualifier_penalty    if a disqualifying keyword is present
//!   + pending_bias            if the caller prefers this intent
//! ```
//!
//! clamped to 0..=1 and rounded to four decimals so equal inputs tie exactly.

use crate::config::ClassifierConfig;
use crate::registry::{IntentRegistry, IntentSpec};
use crate::similarity::{calculate_similarity, is_stopword, keyword_matches, tokenize, Token};
use crate::types::{Entity, EntityType, IntentCandidate, UserIntent};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Similarity at which a phrase template counts as present
const PHRASE_MATCH: f64 = 0.9;

#[derive(Debug, Clone, Copy)]
struct Scored {
    candidate: IntentCandidate,
    satisfied: usize,
    order: usize,
}

pub struct IntentClassifier {
    registry: IntentRegistry,
    config: ClassifierConfig,
}

impl IntentClassifier {
    pub fn new(registry: IntentRegistry, config: ClassifierConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &IntentRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Rank every intent for `text`, best first.
    ///
    /// Always non-empty: `Unknown` is included at the configured floor.
    pub fn classify(&self, text: &str, entities: &[Entity]) -> Vec<IntentCandidate> {
        self.classify_with_bias(text, entities, &[])
    }

    /// Same as [`classify`](Self::classify), with `preferred` intents lifted
    /// by the pending bias.
    pub fn classify_with_bias(
        &self,
        text: &str,
        entities: &[Entity],
        preferred: &[UserIntent],
    ) -> Vec<IntentCandidate> {
        let tokens = content_tokens(text, entities);
        let present: BTreeSet<EntityType> = entities.iter().map(|e| e.entity_type).collect();
        let lowered = text.to_lowercase();

        let mut scored: Vec<Scored> = self
            .registry
            .specs()
            .iter()
            .enumerate()
            .filter_map(|(order, spec)| {
                let preferred = preferred.contains(&spec.intent);
                self.score(spec, &tokens, &present, &lowered, preferred)
                    .map(|(confidence, satisfied)| Scored {
                        candidate: IntentCandidate {
                            intent: spec.intent,
                            confidence,
                        },
                        satisfied,
                        order,
                    })
            })
            .collect();

        scored.push(Scored {
            candidate: IntentCandidate {
                intent: UserIntent::Unknown,
                confidence: round_score(self.config.unknown_floor),
            },
            satisfied: 0,
            order: usize::MAX,
        });

        scored.sort_by(compare_scored);

        tracing::debug!(
            top = %scored[0].candidate.intent,
            confidence = scored[0].candidate.confidence,
            candidates = scored.len(),
            "classified utterance"
        );

        scored.into_iter().map(|s| s.candidate).collect()
    }

    /// True when the utterance carries too few words to stand on its own,
    /// e.g. a bare value answering a clarification.
    pub fn is_terse(&self, text: &str, entities: &[Entity]) -> bool {
        content_tokens(text, entities).len() <= self.config.terse_token_limit
    }

    fn score(
        &self,
        spec: &IntentSpec,
        tokens: &[Token],
        present: &BTreeSet<EntityType>,
        lowered: &str,
        preferred: bool,
    ) -> Option<(f64, usize)> {
        let cfg = &self.config;

        let matched = tokens
            .iter()
            .filter(|t| {
                spec.keywords
                    .iter()
                    .any(|k| keyword_matches(&t.text, k, cfg.fuzzy_threshold))
            })
            .count();
        let coverage = if tokens.is_empty() {
            0.0
        } else {
            matched as f64 / tokens.len() as f64
        };

        let satisfied = spec
            .entity_cues
            .iter()
            .filter(|cue| present.contains(cue))
            .count();

        let mut score = cfg.keyword_weight * coverage + cfg.entity_boost * satisfied as f64;

        if matched > 0
            && spec
                .phrases
                .iter()
                .any(|p| calculate_similarity(lowered, p) >= PHRASE_MATCH)
        {
            score += cfg.phrase_boost;
        }
        if tokens.iter().any(|t| spec.is_disqualified_by(&t.text)) {
            score -= cfg.disqualifier_penalty;
        }
        if preferred {
            score += cfg.pending_bias;
        }

        let score = round_score(score.clamp(0.0, 1.0));
        if score > 0.0 {
            Some((score, satisfied))
        } else {
            None
        }
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(IntentRegistry::builtin(), ClassifierConfig::default())
    }
}

/// Confidence desc, then more cue entities, then declaration order.
fn compare_scored(a: &Scored, b: &Scored) -> Ordering {
    b.candidate
        .confidence
        .partial_cmp(&a.candidate.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.satisfied.cmp(&a.satisfied))
        .then_with(|| a.order.cmp(&b.order))
}

fn round_score(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

/// Non-stopword tokens not covered by any extracted entity
pub(crate) fn content_tokens(text: &str, entities: &[Entity]) -> Vec<Token> {
    tokenize(text)
        .into_iter()
        .filter(|t| !is_stopword(&t.text))
        .filter(|t| !entities.iter().any(|e| e.span.contains(t.start)))
        .collect()
}
