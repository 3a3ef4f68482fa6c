//! Assistant orchestrator - one request in, exactly one response out
//!
//! Per session the dialog moves `Idle -> Recognizing -> Clarifying | Composing`
//! and settles back in `Idle` (or stays in `Clarifying` while a question is
//! open). All state lives in the session's [`IntentContext`]; the updated
//! context is committed in one assignment at the end of the request.

use crate::composition::{
    builtin_templates, ClarificationReason, ClarificationRequest, ComponentComposition,
    CompositionGenerator, GenerationOutcome,
};
use crate::config::{AssistantConfig, RecognizerConfig};
use crate::context::{ContextStore, DialogState, IntentContext};
use crate::error::{IntentError, Result};
use crate::recognizer::IntentRecognizer;
use crate::registry::IntentRegistry;
use crate::semantic::HvacSemantics;
use crate::types::{ConversationTurn, IntentRecognitionResult, PendingClarification, UserIntent};
use crate::validation::StructuralValidator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// User-facing text for every internal fault
pub const FATAL_MESSAGE: &str = "I couldn't process that request.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantResponse {
    Composition {
        intent: UserIntent,
        confidence: f64,
        composition: ComponentComposition,
    },
    Clarification(ClarificationRequest),
    Error {
        message: String,
    },
}

impl AssistantResponse {
    /// Text recorded as the assistant's turn in the transcript
    fn transcript_text(&self) -> String {
        match self {
            AssistantResponse::Composition { composition, .. } => {
                let kinds: Vec<&str> = composition.components.iter().map(|c| c.kind.as_str()).collect();
                format!("Showing {}", kinds.join(", "))
            }
            AssistantResponse::Clarification(request) => request.prompt_text.clone(),
            AssistantResponse::Error { message } => message.clone(),
        }
    }
}

pub struct AssistantOrchestrator {
    recognizer: IntentRecognizer,
    generator: CompositionGenerator,
    store: Arc<ContextStore>,
    ambiguity_margin: f64,
}

impl AssistantOrchestrator {
    /// Wire the pipeline together after checking the intent tables.
    ///
    /// Fails when a required slot can never be extracted or a registered
    /// intent has no composition template.
    pub fn new(
        recognizer: IntentRecognizer,
        generator: CompositionGenerator,
        store: Arc<ContextStore>,
        config: &RecognizerConfig,
    ) -> Result<Self> {
        let producible = recognizer.extractor().producible_types();
        if let Some((intent, slot)) = recognizer.classifier().registry().unproducible_slot(&producible) {
            tracing::error!(%intent, %slot, "required slot cannot be extracted");
            return Err(IntentError::UnproducibleSlot { intent, slot });
        }
        generator.check_templates()?;

        Ok(Self {
            recognizer,
            generator,
            store,
            ambiguity_margin: config.ambiguity_margin,
        })
    }

    /// Builtin intents, templates and collaborators tuned by `config`.
    pub fn from_config(config: &AssistantConfig) -> Result<Self> {
        config.validate()?;
        let registry = IntentRegistry::builtin();
        let recognizer = IntentRecognizer::from_config(registry.clone(), config);
        let generator = CompositionGenerator::new(
            registry,
            builtin_templates(),
            Box::new(HvacSemantics),
            Box::new(StructuralValidator),
        );
        let store = Arc::new(ContextStore::new(config.context.clone()));
        Self::new(recognizer, generator, store, &config.recognizer)
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    pub fn recognizer(&self) -> &IntentRecognizer {
        &self.recognizer
    }

    /// Process one utterance for `session_id`.
    pub fn handle(&self, session_id: &str, utterance: &str, now: DateTime<Utc>) -> AssistantResponse {
        let max_turns = self.store.config().max_turns;

        self.store.with_session(session_id, now, |ctx| {
            transition(session_id, ctx.dialog_state(), DialogState::Recognizing);

            let recognition = self
                .recognizer
                .recognize_with_pending(utterance, ctx.pending_clarification.as_ref());
            let mut next = self.store.merge(ctx, &recognition, utterance, now);
            if let Some(pending) = &ctx.pending_clarification {
                self.complete_pending_unit(session_id, pending, &recognition, utterance, &mut next);
            }

            let response = self.respond(session_id, &recognition, &mut next);

            if matches!(response, AssistantResponse::Composition { .. }) {
                transition(session_id, DialogState::Recognizing, DialogState::Composing);
                transition(session_id, DialogState::Composing, next.dialog_state());
            } else {
                transition(session_id, DialogState::Recognizing, next.dialog_state());
            }

            next.push_turn(ConversationTurn::assistant(response.transcript_text(), now), max_turns);
            *ctx = next;
            response
        })
    }

    /// Attach a bare unit reply ("celsius") to the value that was asked about.
    fn complete_pending_unit(
        &self,
        session_id: &str,
        pending: &PendingClarification,
        recognition: &IntentRecognitionResult,
        utterance: &str,
        next: &mut IntentContext,
    ) {
        let Some(slot) = pending.unit_slot() else {
            return;
        };
        if recognition.intent != pending.for_intent || recognition.entity(slot).is_some() {
            return;
        }
        if let Some(unit) = self.recognizer.unit_answer(utterance) {
            if next.complete_unit(slot, unit) {
                tracing::debug!(session_id, %slot, unit = unit.as_str(), "unit attached to held value");
            }
        }
    }

    fn respond(
        &self,
        session_id: &str,
        recognition: &IntentRecognitionResult,
        next: &mut IntentContext,
    ) -> AssistantResponse {
        let intent = recognition.intent;

        if intent == UserIntent::Unknown {
            tracing::debug!(session_id, "utterance not recognized");
            return AssistantResponse::Clarification(ClarificationRequest::unrecognized());
        }

        if let Some(runner_up) = recognition.runner_up_within(self.ambiguity_margin) {
            tracing::warn!(
                session_id,
                first = %intent,
                second = %runner_up.intent,
                confidence = recognition.confidence,
                "ambiguous intent"
            );
            next.pending_clarification =
                Some(PendingClarification::disambiguate(vec![intent, runner_up.intent]));
            return AssistantResponse::Clarification(ClarificationRequest::ambiguous(
                intent,
                runner_up.intent,
            ));
        }

        match self.generator.generate(intent, &recognition.entities, next) {
            Ok(GenerationOutcome::Composition(composition)) => {
                next.pending_clarification = None;
                AssistantResponse::Composition {
                    intent,
                    confidence: recognition.confidence,
                    composition,
                }
            }
            Ok(GenerationOutcome::Clarification(request)) => {
                let for_intent = request.for_intent.unwrap_or(intent);
                next.pending_clarification = Some(match (request.reason, request.missing_slot) {
                    (ClarificationReason::MissingUnit, Some(slot)) => {
                        PendingClarification::missing_unit(for_intent, slot)
                    }
                    (_, Some(slot)) => PendingClarification::missing(for_intent, slot),
                    (_, None) => PendingClarification::disambiguate(vec![for_intent]),
                });
                AssistantResponse::Clarification(request)
            }
            Err(error) => {
                tracing::error!(
                    session_id,
                    %intent,
                    internal = error.is_internal_configuration(),
                    %error,
                    "request aborted"
                );
                AssistantResponse::Error {
                    message: FATAL_MESSAGE.to_string(),
                }
            }
        }
    }

    /// Forget a session, e.g. on logout.
    pub fn end_session(&self, session_id: &str) -> bool {
        self.store.remove(session_id)
    }

    /// Evict idle sessions; meant to run on a timer owned by the host.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.store.sweep(now)
    }
}

fn transition(session_id: &str, from: DialogState, to: DialogState) {
    tracing::debug!(session_id, ?from, ?to, "dialog transition");
}
