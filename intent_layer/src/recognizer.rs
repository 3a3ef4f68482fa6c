//! Intent recognizer - extraction plus classification for one utterance

use crate::classifier::IntentClassifier;
use crate::config::AssistantConfig;
use crate::entities::EntityExtractor;
use crate::registry::IntentRegistry;
use crate::similarity::{is_stopword, keyword_matches, tokenize, Token};
use crate::types::{IntentRecognitionResult, PendingClarification, Unit, UserIntent};

pub struct IntentRecognizer {
    extractor: EntityExtractor,
    classifier: IntentClassifier,
}

impl IntentRecognizer {
    pub fn new(extractor: EntityExtractor, classifier: IntentClassifier) -> Self {
        Self {
            extractor,
            classifier,
        }
    }

    pub fn from_config(registry: IntentRegistry, config: &AssistantConfig) -> Self {
        Self::new(
            EntityExtractor::new(),
            IntentClassifier::new(registry, config.classifier.clone()),
        )
    }

    pub fn extractor(&self) -> &EntityExtractor {
        &self.extractor
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// Recognize a standalone utterance.
    pub fn recognize(&self, text: &str) -> IntentRecognitionResult {
        self.recognize_with_pending(text, None)
    }

    /// Recognize an utterance that may be answering `pending`.
    ///
    /// The pending intent is only preferred when the reply is terse; a full
    /// sentence is classified on its own merits.
    pub fn recognize_with_pending(
        &self,
        text: &str,
        pending: Option<&PendingClarification>,
    ) -> IntentRecognitionResult {
        let entities = self.extractor.extract(text);

        let preferred = match pending {
            Some(p) if self.classifier.is_terse(text, &entities) => {
                self.echoed_options(text, p.preferred_intents())
            }
            _ => Vec::new(),
        };
        if !preferred.is_empty() {
            tracing::debug!(?preferred, "biasing terse follow-up towards pending intent");
        }

        let ranked = self.classifier.classify_with_bias(text, &entities, &preferred);
        IntentRecognitionResult::from_ranked(ranked, entities)
    }

    /// Narrow disambiguation options to the one whose label the reply
    /// repeats, e.g. "control equipment". Unchanged when no single option
    /// stands out.
    fn echoed_options(&self, text: &str, options: Vec<UserIntent>) -> Vec<UserIntent> {
        if options.len() < 2 {
            return options;
        }
        let threshold = self.classifier.config().fuzzy_threshold;
        let words = meaningful_tokens(text);
        let hits = |intent: UserIntent| {
            let label = meaningful_tokens(intent.label());
            words
                .iter()
                .filter(|w| label.iter().any(|l| keyword_matches(&w.text, &l.text, threshold)))
                .count()
        };

        let best = options.iter().map(|o| hits(*o)).max().unwrap_or(0);
        if best == 0 {
            return options;
        }
        let echoed: Vec<UserIntent> = options.iter().copied().filter(|o| hits(*o) == best).collect();
        if echoed.len() == 1 {
            tracing::debug!(chosen = %echoed[0], "reply names a disambiguation option");
            echoed
        } else {
            options
        }
    }

    /// Unit named by a bare reply such as "celsius", "°F" or "in percent"
    pub fn unit_answer(&self, text: &str) -> Option<Unit> {
        Unit::parse(text).or_else(|| {
            let words: String = meaningful_tokens(text).into_iter().map(|t| t.text).collect();
            Unit::parse(&words)
        })
    }
}

fn meaningful_tokens(text: &str) -> Vec<Token> {
    tokenize(text).into_iter().filter(|t| !is_stopword(&t.text)).collect()
}

impl Default for IntentRecognizer {
    fn default() -> Self {
        Self::new(EntityExtractor::new(), IntentClassifier::default())
    }
}
