//! Core data types for recognition results and conversation state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of business intents the assistant understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserIntent {
    QueryStatus,
    ControlEquipment,
    ShowChart,
    SetThreshold,
    Acknowledge,
    ShowDashboard,
    Unknown,
}

impl UserIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserIntent::QueryStatus => "query_status",
            UserIntent::ControlEquipment => "control_equipment",
            UserIntent::ShowChart => "show_chart",
            UserIntent::SetThreshold => "set_threshold",
            UserIntent::Acknowledge => "acknowledge",
            UserIntent::ShowDashboard => "show_dashboard",
            UserIntent::Unknown => "unknown",
        }
    }

    /// Short human label used in disambiguation prompts
    pub fn label(&self) -> &'static str {
        match self {
            UserIntent::QueryStatus => "check equipment status",
            UserIntent::ControlEquipment => "control equipment",
            UserIntent::ShowChart => "show a chart",
            UserIntent::SetThreshold => "set a threshold",
            UserIntent::Acknowledge => "acknowledge alarms",
            UserIntent::ShowDashboard => "open the dashboard",
            UserIntent::Unknown => "something else",
        }
    }
}

impl fmt::Display for UserIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of values the extractor can pull out of an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Device,
    Location,
    Metric,
    TimeRange,
    Threshold,
    Mode,
    Severity,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        EntityType::Device,
        EntityType::Location,
        EntityType::Metric,
        EntityType::TimeRange,
        EntityType::Threshold,
        EntityType::Mode,
        EntityType::Severity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Device => "device",
            EntityType::Location => "location",
            EntityType::Metric => "metric",
            EntityType::TimeRange => "time_range",
            EntityType::Threshold => "threshold",
            EntityType::Mode => "mode",
            EntityType::Severity => "severity",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized measurement units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Celsius,
    Fahrenheit,
    Percent,
    Pascal,
    Kilopascal,
    Ppm,
    Kilowatt,
    KilowattHour,
    Cfm,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Celsius => "celsius",
            Unit::Fahrenheit => "fahrenheit",
            Unit::Percent => "percent",
            Unit::Pascal => "pascal",
            Unit::Kilopascal => "kilopascal",
            Unit::Ppm => "ppm",
            Unit::Kilowatt => "kilowatt",
            Unit::KilowattHour => "kilowatt_hour",
            Unit::Cfm => "cfm",
        }
    }

    /// Map a unit spelling to a unit, ignoring case and whitespace.
    ///
    /// "degrees" without a scale is read as celsius.
    pub fn parse(raw: &str) -> Option<Unit> {
        let compact: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        match compact.as_str() {
            "°" | "°c" | "c" | "celsius" | "degc" | "degree" | "degrees" | "degreec" | "degreesc"
            | "degreecelsius" | "degreescelsius" => Some(Unit::Celsius),
            "°f" | "f" | "fahrenheit" | "degf" | "degreef" | "degreesf" | "degreefahrenheit"
            | "degreesfahrenheit" => Some(Unit::Fahrenheit),
            "%" | "percent" | "pct" => Some(Unit::Percent),
            "pa" | "pascal" | "pascals" => Some(Unit::Pascal),
            "kpa" => Some(Unit::Kilopascal),
            "ppm" => Some(Unit::Ppm),
            "kw" => Some(Unit::Kilowatt),
            "kwh" => Some(Unit::KilowattHour),
            "cfm" => Some(Unit::Cfm),
            _ => None,
        }
    }
}

/// A number with its (optional) normalized unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: Option<Unit>,
}

/// A relative time window such as "last hour"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Compact range code handed to data queries, e.g. "1h", "7d", "today"
    pub code: String,
    pub seconds: u64,
}

impl TimeRange {
    pub fn new(code: impl Into<String>, seconds: u64) -> Self {
        Self {
            code: code.into(),
            seconds,
        }
    }
}

/// Extracted value payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EntityValue {
    Text(String),
    Quantity(Quantity),
    TimeRange(TimeRange),
    Enum(String),
}

/// Byte offsets into the source text, `start < end <= text.len()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// Represents an extracted entity from user input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub value: EntityValue,
    pub original: String,
    pub span: Span,
    pub confidence: f64,
}

impl Entity {
    pub fn new(
        entity_type: EntityType,
        value: EntityValue,
        original: String,
        span: Span,
        confidence: f64,
    ) -> Self {
        Self {
            entity_type,
            value,
            original,
            span,
            confidence,
        }
    }

    /// Plain text rendering of the value, as used in props and queries
    pub fn text(&self) -> String {
        match &self.value {
            EntityValue::Text(s) | EntityValue::Enum(s) => s.clone(),
            EntityValue::TimeRange(range) => range.code.clone(),
            EntityValue::Quantity(q) => format_number(q.value),
        }
    }

    pub fn quantity(&self) -> Option<&Quantity> {
        match &self.value {
            EntityValue::Quantity(q) => Some(q),
            _ => None,
        }
    }
}

pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// One ranked classifier candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntentCandidate {
    pub intent: UserIntent,
    pub confidence: f64,
}

/// Outcome of recognizing one utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRecognitionResult {
    pub intent: UserIntent,
    pub confidence: f64,
    pub entities: Vec<Entity>,
    /// Remaining candidates, best first; never above `confidence`
    pub alternatives: Vec<IntentCandidate>,
}

impl IntentRecognitionResult {
    /// Builds a result from a descending candidate list.
    ///
    /// An empty list degrades to `Unknown` with zero confidence.
    pub fn from_ranked(mut ranked: Vec<IntentCandidate>, entities: Vec<Entity>) -> Self {
        if ranked.is_empty() {
            return Self {
                intent: UserIntent::Unknown,
                confidence: 0.0,
                entities,
                alternatives: Vec::new(),
            };
        }
        let best = ranked.remove(0);
        Self {
            intent: best.intent,
            confidence: best.confidence,
            entities,
            alternatives: ranked,
        }
    }

    /// Second best intent when it sits within `margin` of the best.
    ///
    /// `Unknown` never takes part in a tie.
    pub fn runner_up_within(&self, margin: f64) -> Option<IntentCandidate> {
        if self.intent == UserIntent::Unknown {
            return None;
        }
        let second = self.alternatives.first()?;
        if second.intent == UserIntent::Unknown {
            return None;
        }
        if self.confidence - second.confidence < margin {
            Some(*second)
        } else {
            None
        }
    }

    pub fn entity(&self, entity_type: EntityType) -> Option<&Entity> {
        self.entities
            .iter()
            .rev()
            .find(|e| e.entity_type == entity_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Immutable log entry of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recognized_intent: Option<UserIntent>,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>, intent: UserIntent, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            recognized_intent: Some(intent),
            timestamp,
        }
    }

    pub fn assistant(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            recognized_intent: None,
            timestamp,
        }
    }
}

/// The question the assistant is waiting on an answer for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingClarification {
    pub for_intent: UserIntent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_slot: Option<EntityType>,
    /// Competing intents when the question is a disambiguation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<UserIntent>,
    /// The slot holds a value and only its unit is asked for
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub awaiting_unit: bool,
}

impl PendingClarification {
    pub fn missing(for_intent: UserIntent, slot: EntityType) -> Self {
        Self {
            for_intent,
            missing_slot: Some(slot),
            options: Vec::new(),
            awaiting_unit: false,
        }
    }

    pub fn missing_unit(for_intent: UserIntent, slot: EntityType) -> Self {
        Self {
            awaiting_unit: true,
            ..Self::missing(for_intent, slot)
        }
    }

    pub fn disambiguate(options: Vec<UserIntent>) -> Self {
        Self {
            for_intent: options.first().copied().unwrap_or(UserIntent::Unknown),
            missing_slot: None,
            options,
            awaiting_unit: false,
        }
    }

    /// Slot whose held quantity a bare unit reply completes
    pub fn unit_slot(&self) -> Option<EntityType> {
        self.missing_slot.filter(|_| self.awaiting_unit)
    }

    /// Intents a terse follow-up should lean towards
    pub fn preferred_intents(&self) -> Vec<UserIntent> {
        if self.options.is_empty() {
            vec![self.for_intent]
        } else {
            self.options.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(intent: UserIntent, confidence: f64) -> IntentCandidate {
        IntentCandidate { intent, confidence }
    }

    #[test]
    fn test_unit_parse_spellings() {
        assert_eq!(Unit::parse("°C"), Some(Unit::Celsius));
        assert_eq!(Unit::parse("26"), None);
        assert_eq!(Unit::parse("degrees"), Some(Unit::Celsius));
        assert_eq!(Unit::parse("degrees f"), Some(Unit::Fahrenheit));
        assert_eq!(Unit::parse("kwh"), Some(Unit::KilowattHour));
        assert_eq!(Unit::parse("furlongs"), None);
    }

    #[test]
    fn test_runner_up_within_margin() {
        let result = IntentRecognitionResult::from_ranked(
            vec![
                candidate(UserIntent::ShowChart, 0.62),
                candidate(UserIntent::ShowDashboard, 0.6),
                candidate(UserIntent::Unknown, 0.25),
            ],
            Vec::new(),
        );
        assert_eq!(result.intent, UserIntent::ShowChart);
        assert_eq!(
            result.runner_up_within(0.05).map(|c| c.intent),
            Some(UserIntent::ShowDashboard)
        );
        assert!(result.runner_up_within(0.01).is_none());
    }

    #[test]
    fn test_unknown_never_ties() {
        let result = IntentRecognitionResult::from_ranked(
            vec![
                candidate(UserIntent::ShowChart, 0.26),
                candidate(UserIntent::Unknown, 0.25),
            ],
            Vec::new(),
        );
        assert!(result.runner_up_within(0.05).is_none());
    }

    #[test]
    fn test_empty_ranking_degrades_to_unknown() {
        let result = IntentRecognitionResult::from_ranked(Vec::new(), Vec::new());
        assert_eq!(result.intent, UserIntent::Unknown);
        assert!(result.alternatives.is_empty());
    }

    #[test]
    fn test_entity_text_formats_whole_numbers() {
        let entity = Entity::new(
            EntityType::Threshold,
            EntityValue::Quantity(Quantity {
                value: 26.0,
                unit: None,
            }),
            "26".to_string(),
            Span::new(0, 2),
            0.7,
        );
        assert_eq!(entity.text(), "26");
    }
}
