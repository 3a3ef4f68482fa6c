//! Conversation context - per-session memory across turns
//!
//! [`IntentContext`] is a plain value: merging a recognition produces a new
//! context and leaves the old one untouched. [`ContextStore`] is the only
//! place holding shared mutable state; it hands out one session at a time
//! under that session's lock.

use crate::config::ContextConfig;
use crate::types::{
    ConversationTurn, Entity, EntityType, EntityValue, IntentRecognitionResult,
    PendingClarification, Unit,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Where a session sits in the assistant's request cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogState {
    Idle,
    Recognizing,
    Clarifying,
    Composing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentContext {
    pub session_id: String,
    pub turns: Vec<ConversationTurn>,
    /// At most one entity per type, latest extraction wins
    pub active_slots: BTreeMap<EntityType, Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_clarification: Option<PendingClarification>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl IntentContext {
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            turns: Vec::new(),
            active_slots: BTreeMap::new(),
            pending_clarification: None,
            created_at: now,
            last_updated: now,
        }
    }

    /// Fold a recognition into a copy of this context.
    pub fn merged(
        &self,
        recognition: &IntentRecognitionResult,
        utterance: &str,
        now: DateTime<Utc>,
        max_turns: usize,
    ) -> IntentContext {
        let mut next = self.clone();
        for entity in &recognition.entities {
            next.active_slots.insert(entity.entity_type, entity.clone());
        }
        next.push_turn(
            ConversationTurn::user(utterance, recognition.intent, now),
            max_turns,
        );
        next.last_updated = now;
        next
    }

    pub fn push_turn(&mut self, turn: ConversationTurn, max_turns: usize) {
        self.turns.push(turn);
        if self.turns.len() > max_turns {
            let overflow = self.turns.len() - max_turns;
            self.turns.drain(..overflow);
        }
    }

    /// Active slots overlaid with this turn's entities; this turn wins.
    pub fn effective_slots(&self, entities: &[Entity]) -> BTreeMap<EntityType, Entity> {
        let mut slots = self.active_slots.clone();
        for entity in entities {
            slots.insert(entity.entity_type, entity.clone());
        }
        slots
    }

    /// Give the unit-less quantity held in `slot` its unit.
    ///
    /// Returns false when the slot is empty or already carries a unit.
    pub fn complete_unit(&mut self, slot: EntityType, unit: Unit) -> bool {
        match self.active_slots.get_mut(&slot) {
            Some(Entity {
                value: EntityValue::Quantity(quantity),
                ..
            }) if quantity.unit.is_none() => {
                quantity.unit = Some(unit);
                true
            }
            _ => false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        now.signed_duration_since(self.last_updated) > idle_timeout
    }

    /// State between requests: waiting on an answer or idle
    pub fn dialog_state(&self) -> DialogState {
        if self.pending_clarification.is_some() {
            DialogState::Clarifying
        } else {
            DialogState::Idle
        }
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

type SessionHandle = Arc<Mutex<IntentContext>>;

/// Keyed store of live conversation contexts
pub struct ContextStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    config: ContextConfig,
}

impl ContextStore {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Snapshot of the session's context, creating it on first reference.
    pub fn get_or_create(&self, session_id: &str, now: DateTime<Utc>) -> IntentContext {
        self.with_session(session_id, now, |ctx| ctx.clone())
    }

    /// Run `f` with exclusive access to one session's context.
    ///
    /// The context is created if missing and reset if it sat idle past the
    /// timeout. Other sessions are not blocked.
    pub fn with_session<R>(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut IntentContext) -> R,
    ) -> R {
        let handle = self.handle(session_id, now);
        let mut ctx = handle.lock();
        if ctx.is_expired(now, self.config.idle_timeout()) {
            tracing::info!(
                session_id,
                idle_since = %ctx.last_updated,
                "context expired, starting fresh"
            );
            *ctx = IntentContext::new(session_id, now);
        }
        f(&mut ctx)
    }

    fn handle(&self, session_id: &str, now: DateTime<Utc>) -> SessionHandle {
        if let Some(handle) = self.sessions.read().get(session_id) {
            return Arc::clone(handle);
        }
        let mut sessions = self.sessions.write();
        let handle = sessions.entry(session_id.to_string()).or_insert_with(|| {
            tracing::info!(session_id, "context created");
            Arc::new(Mutex::new(IntentContext::new(session_id, now)))
        });
        Arc::clone(handle)
    }

    /// Fold a recognition into `context` using this store's turn cap.
    pub fn merge(
        &self,
        context: &IntentContext,
        recognition: &IntentRecognitionResult,
        utterance: &str,
        now: DateTime<Utc>,
    ) -> IntentContext {
        context.merged(recognition, utterance, now, self.config.max_turns)
    }

    /// `None` when `context` has been idle past the timeout.
    pub fn expire(&self, context: IntentContext, now: DateTime<Utc>) -> Option<IntentContext> {
        if context.is_expired(now, self.config.idle_timeout()) {
            None
        } else {
            Some(context)
        }
    }

    /// Evict every expired session not currently held by a request.
    ///
    /// Returns the number of evicted sessions.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let timeout = self.config.idle_timeout();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|session_id, handle| {
            // Handles are only cloned under the map lock, so a count of one
            // means no request is using this session.
            if Arc::strong_count(handle) > 1 {
                return true;
            }
            let expired = handle.lock().is_expired(now, timeout);
            if expired {
                tracing::info!(session_id = %session_id, "context evicted");
            }
            !expired
        });
        before - sessions.len()
    }

    /// Drop a session explicitly, e.g. on logout.
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().remove(session_id).is_some();
        if removed {
            tracing::info!(session_id, "context removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityValue, Quantity, Role, Span, TimeRange, Unit, UserIntent};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn metric(name: &str) -> Entity {
        Entity::new(
            EntityType::Metric,
            EntityValue::Enum(name.to_string()),
            name.to_string(),
            Span::new(0, name.len()),
            0.85,
        )
    }

    fn recognition(intent: UserIntent, entities: Vec<Entity>) -> IntentRecognitionResult {
        IntentRecognitionResult {
            intent,
            confidence: 0.8,
            entities,
            alternatives: Vec::new(),
        }
    }

    #[test]
    fn test_slots_latest_wins() {
        let ctx = IntentContext::new("s1", at(0));
        let first = ctx.merged(&recognition(UserIntent::ShowChart, vec![metric("temperature")]), "temperature", at(1), 20);
        let second = first.merged(&recognition(UserIntent::ShowChart, vec![metric("humidity")]), "humidity", at(2), 20);

        assert_eq!(second.active_slots.len(), 1);
        assert_eq!(second.active_slots[&EntityType::Metric].text(), "humidity");
        assert_eq!(second.turns.len(), 2);
        assert_eq!(second.last_updated, at(2));
        // merge leaves its input untouched
        assert_eq!(first.active_slots[&EntityType::Metric].text(), "temperature");
    }

    #[test]
    fn test_complete_unit_only_fills_missing_unit() {
        let bare = Entity::new(
            EntityType::Threshold,
            EntityValue::Quantity(Quantity { value: 26.0, unit: None }),
            "26".to_string(),
            Span::new(0, 2),
            0.7,
        );
        let mut ctx = IntentContext::new("s1", at(0));
        assert!(!ctx.complete_unit(EntityType::Threshold, Unit::Celsius));

        ctx.active_slots.insert(EntityType::Threshold, bare);
        assert!(ctx.complete_unit(EntityType::Threshold, Unit::Celsius));
        assert_eq!(
            ctx.active_slots[&EntityType::Threshold].quantity().unwrap().unit,
            Some(Unit::Celsius)
        );
        assert!(!ctx.complete_unit(EntityType::Threshold, Unit::Fahrenheit));

        ctx.active_slots.insert(EntityType::Metric, metric("humidity"));
        assert!(!ctx.complete_unit(EntityType::Metric, Unit::Percent));
    }

    #[test]
    fn test_turns_are_capped() {
        let mut ctx = IntentContext::new("s1", at(0));
        for i in 0..5 {
            ctx = ctx.merged(&recognition(UserIntent::Unknown, Vec::new()), &format!("turn {i}"), at(i), 3);
        }
        assert_eq!(ctx.turns.len(), 3);
        assert_eq!(ctx.turns[0].text, "turn 2");
        assert_eq!(ctx.turns[0].role, Role::User);
    }

    #[test]
    fn test_effective_slots_prefer_current_turn() {
        let ctx = IntentContext::new("s1", at(0))
            .merged(&recognition(UserIntent::ShowChart, vec![metric("temperature")]), "t", at(1), 20);
        let slots = ctx.effective_slots(&[metric("co2")]);
        assert_eq!(slots[&EntityType::Metric].text(), "co2");
    }

    #[test]
    fn test_json_round_trip() {
        let threshold = Entity::new(
            EntityType::Threshold,
            EntityValue::Quantity(Quantity {
                value: 26.5,
                unit: Some(Unit::Celsius),
            }),
            "26.5°C".to_string(),
            Span::new(17, 24),
            0.95,
        );
        let range = Entity::new(
            EntityType::TimeRange,
            EntityValue::TimeRange(TimeRange::new("1h", 3_600)),
            "last hour".to_string(),
            Span::new(0, 9),
            0.95,
        );
        let mut ctx = IntentContext::new("session-42", at(0))
            .merged(&recognition(UserIntent::SetThreshold, vec![threshold, range]), "set threshold to 26.5°C", at(5), 20);
        ctx.pending_clarification = Some(PendingClarification::missing(UserIntent::ShowChart, EntityType::Metric));
        ctx.push_turn(ConversationTurn::assistant("Which metric?", at(6)), 20);

        let restored = IntentContext::from_json(&ctx.to_json().unwrap()).unwrap();
        assert_eq!(restored, ctx);
        assert_eq!(restored.turns.len(), 2);
        assert_eq!(restored.active_slots.len(), 2);
    }

    #[test]
    fn test_expire_is_none_past_timeout() {
        let store = ContextStore::new(ContextConfig {
            idle_timeout_secs: 60,
            max_turns: 20,
        });
        let ctx = IntentContext::new("s1", at(0));
        assert!(store.expire(ctx.clone(), at(60)).is_some());
        assert!(store.expire(ctx, at(61)).is_none());
    }

    #[test]
    fn test_expired_session_restarts_fresh() {
        let store = ContextStore::new(ContextConfig {
            idle_timeout_secs: 60,
            max_turns: 20,
        });
        store.with_session("s1", at(0), |ctx| {
            *ctx = ctx.merged(&recognition(UserIntent::ShowChart, vec![metric("temperature")]), "t", at(0), 20);
            ctx.pending_clarification = Some(PendingClarification::missing(UserIntent::ShowChart, EntityType::Device));
        });

        let live = store.get_or_create("s1", at(30));
        assert_eq!(live.active_slots.len(), 1);

        let fresh = store.get_or_create("s1", at(200));
        assert!(fresh.active_slots.is_empty());
        assert!(fresh.pending_clarification.is_none());
        assert_eq!(fresh.session_id, "s1");
        assert_eq!(fresh.dialog_state(), DialogState::Idle);
    }

    #[test]
    fn test_sweep_evicts_idle_sessions_only() {
        let store = ContextStore::new(ContextConfig {
            idle_timeout_secs: 60,
            max_turns: 20,
        });
        store.get_or_create("old", at(0));
        store.get_or_create("recent", at(100));
        assert_eq!(store.len(), 2);

        assert_eq!(store.sweep(at(120)), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_or_create("recent", at(121)).created_at, at(100));
    }

    #[test]
    fn test_sweep_skips_session_in_use() {
        let store = ContextStore::new(ContextConfig {
            idle_timeout_secs: 60,
            max_turns: 20,
        });
        store.get_or_create("busy", at(0));
        let evicted = store.with_session("busy", at(0), |_| store.sweep(at(500)));
        assert_eq!(evicted, 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_session() {
        let store = ContextStore::default();
        store.get_or_create("s1", at(0));
        assert!(store.remove("s1"));
        assert!(!store.remove("s1"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_sessions_are_independent_across_threads() {
        let store = Arc::new(ContextStore::default());
        let workers: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let id = format!("session-{i}");
                    for n in 0..10 {
                        store.with_session(&id, at(n), |ctx| {
                            *ctx = ctx.merged(&recognition(UserIntent::ShowChart, vec![metric("temperature")]), "t", at(n), 20);
                        });
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(store.len(), 4);
        for i in 0..4 {
            let ctx = store.get_or_create(&format!("session-{i}"), at(10));
            assert_eq!(ctx.turns.len(), 10);
        }
    }
}
