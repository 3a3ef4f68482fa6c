//! Static intent table
//!
//! One row per recognizable intent. The classifier reads the matching
//! vocabulary, the composition generator reads the slot requirements.
//! Row order is the tie-break order.

use crate::types::{EntityType, UserIntent};
use std::collections::BTreeSet;

/// A slot an intent cannot be composed without
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRequirement {
    pub slot: EntityType,
    /// The slot's quantity must carry a unit
    pub needs_unit: bool,
}

impl SlotRequirement {
    pub const fn value(slot: EntityType) -> Self {
        Self {
            slot,
            needs_unit: false,
        }
    }

    pub const fn with_unit(slot: EntityType) -> Self {
        Self {
            slot,
            needs_unit: true,
        }
    }
}

/// Matching vocabulary and slot contract for one intent
#[derive(Debug, Clone)]
pub struct IntentSpec {
    pub intent: UserIntent,
    pub keywords: &'static [&'static str],
    /// Phrase templates; a near match adds the phrase boost
    pub phrases: &'static [&'static str],
    /// Entity types whose presence boosts this intent
    pub entity_cues: &'static [EntityType],
    /// Keywords that point at a different intent
    pub disqualifiers: &'static [&'static str],
    pub required_slots: &'static [SlotRequirement],
    /// Slots filled into the composition when present
    pub optional_slots: &'static [EntityType],
}

impl IntentSpec {
    /// Whether `token` is one of this intent's disqualifying keywords
    pub fn is_disqualified_by(&self, token: &str) -> bool {
        self.disqualifiers.contains(&token)
    }

    /// Whether `slot` takes part in this intent's composition
    pub fn accepts(&self, slot: EntityType) -> bool {
        self.optional_slots.contains(&slot) || self.required_slots.iter().any(|req| req.slot == slot)
    }
}

const BUILTIN: &[IntentSpec] = &[
    IntentSpec {
        intent: UserIntent::QueryStatus,
        keywords: &[
            "status", "state", "check", "running", "current", "currently", "how", "what",
            "whats", "doing", "health", "condition", "online", "offline",
        ],
        phrases: &["what is the status", "how is", "is it running"],
        entity_cues: &[EntityType::Device, EntityType::Location],
        disqualifiers: &["chart", "graph", "trend", "turn", "threshold", "acknowledge"],
        required_slots: &[],
        optional_slots: &[EntityType::Device, EntityType::Location],
    },
    IntentSpec {
        intent: UserIntent::ControlEquipment,
        keywords: &[
            "turn", "switch", "start", "stop", "set", "change", "mode", "power", "enable",
            "disable", "run", "restart", "put", "control",
        ],
        phrases: &["turn on", "turn off", "switch to", "set mode"],
        entity_cues: &[EntityType::Device, EntityType::Mode],
        disqualifiers: &["chart", "graph", "threshold", "limit", "status", "acknowledge"],
        required_slots: &[
            SlotRequirement::value(EntityType::Device),
            SlotRequirement::value(EntityType::Mode),
        ],
        optional_slots: &[EntityType::Threshold, EntityType::Location],
    },
    IntentSpec {
        intent: UserIntent::ShowChart,
        keywords: &[
            "show", "chart", "charts", "graph", "plot", "trend", "trends", "display", "history",
            "visualize", "view", "see",
        ],
        phrases: &["show me", "chart of", "trend of", "how has"],
        entity_cues: &[EntityType::Metric, EntityType::TimeRange],
        disqualifiers: &["threshold", "acknowledge", "turn", "alarm", "alarms", "dashboard"],
        required_slots: &[SlotRequirement::value(EntityType::Metric)],
        optional_slots: &[EntityType::Device, EntityType::Location, EntityType::TimeRange],
    },
    IntentSpec {
        intent: UserIntent::SetThreshold,
        keywords: &[
            "set", "threshold", "thresholds", "limit", "limits", "setpoint", "alert", "alarm",
            "above", "below", "exceeds", "max", "maximum", "min", "minimum", "trigger",
        ],
        phrases: &["set threshold", "alert me when", "alarm above", "alarm below"],
        entity_cues: &[EntityType::Threshold],
        disqualifiers: &["chart", "graph", "acknowledge", "dismiss"],
        required_slots: &[SlotRequirement::with_unit(EntityType::Threshold)],
        optional_slots: &[EntityType::Metric, EntityType::Device, EntityType::Location],
    },
    IntentSpec {
        intent: UserIntent::Acknowledge,
        keywords: &[
            "acknowledge", "ack", "dismiss", "silence", "clear", "mute", "confirm", "alarm",
            "alarms", "alert", "alerts",
        ],
        phrases: &["acknowledge all", "clear alarms", "silence the alarm"],
        entity_cues: &[EntityType::Severity],
        disqualifiers: &["threshold", "limit", "chart", "setpoint"],
        required_slots: &[],
        optional_slots: &[EntityType::Severity, EntityType::Device, EntityType::Location],
    },
    IntentSpec {
        intent: UserIntent::ShowDashboard,
        keywords: &[
            "dashboard", "overview", "summary", "everything", "home", "show", "open", "main",
        ],
        phrases: &["open the dashboard", "give me an overview"],
        entity_cues: &[],
        disqualifiers: &["chart", "graph", "threshold", "turn", "acknowledge"],
        required_slots: &[],
        optional_slots: &[EntityType::Location, EntityType::TimeRange, EntityType::Severity],
    },
];

/// Ordered intent table
#[derive(Debug, Clone)]
pub struct IntentRegistry {
    specs: Vec<IntentSpec>,
}

impl IntentRegistry {
    pub fn builtin() -> Self {
        Self {
            specs: BUILTIN.to_vec(),
        }
    }

    pub fn from_specs(specs: Vec<IntentSpec>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &[IntentSpec] {
        &self.specs
    }

    pub fn get(&self, intent: UserIntent) -> Option<&IntentSpec> {
        self.specs.iter().find(|spec| spec.intent == intent)
    }

    pub fn required_slots(&self, intent: UserIntent) -> &[SlotRequirement] {
        self.get(intent).map(|spec| spec.required_slots).unwrap_or(&[])
    }

    /// First required slot type the extractor set cannot produce.
    pub fn unproducible_slot(
        &self,
        producible: &BTreeSet<EntityType>,
    ) -> Option<(UserIntent, EntityType)> {
        self.specs.iter().find_map(|spec| {
            spec.required_slots
                .iter()
                .find(|req| !producible.contains(&req.slot))
                .map(|req| (spec.intent, req.slot))
        })
    }
}

impl Default for IntentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
