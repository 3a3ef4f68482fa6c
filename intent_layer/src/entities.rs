//! Entity extraction from user input
//!
//! Extractors run in a fixed priority order. When two matches overlap, the
//! match from the earlier extractor is kept and the other one is dropped, so
//! "last 24 hours" stays a time range and "AHU-1" never yields a bare number.

use crate::types::{Entity, EntityType, EntityValue, Quantity, Span, TimeRange, Unit};
use regex::{Captures, Regex};
use std::collections::BTreeSet;

const RANGE_CONFIDENCE: f64 = 0.95;
const DEVICE_CONFIDENCE: f64 = 0.95;
const LOCATION_CONFIDENCE: f64 = 0.9;
const MODE_SWITCH_CONFIDENCE: f64 = 0.9;
const QUANTITY_WITH_UNIT_CONFIDENCE: f64 = 0.95;
const QUANTITY_CONFIDENCE: f64 = 0.7;
const VOCABULARY_CONFIDENCE: f64 = 0.85;

/// How a regex match is turned into an entity
#[derive(Debug, Clone)]
enum Rule {
    RelativeRange,
    NamedRange,
    Device,
    Location,
    ModeSwitch,
    Quantity,
    Vocabulary {
        entity_type: EntityType,
        canonical: &'static str,
    },
}

impl Rule {
    fn entity_type(&self) -> EntityType {
        match self {
            Rule::RelativeRange | Rule::NamedRange => EntityType::TimeRange,
            Rule::Device => EntityType::Device,
            Rule::Location => EntityType::Location,
            Rule::ModeSwitch => EntityType::Mode,
            Rule::Quantity => EntityType::Threshold,
            Rule::Vocabulary { entity_type, .. } => *entity_type,
        }
    }

    fn apply(&self, caps: &Captures<'_>, text: &str) -> Option<Entity> {
        match self {
            Rule::RelativeRange => {
                let whole = caps.get(0)?;
                let count = match caps.get(1) {
                    Some(m) => m.as_str().parse::<u64>().ok()?,
                    None => 1,
                };
                if count == 0 {
                    return None;
                }
                let (suffix, unit_secs) = match caps.get(2)?.as_str().to_lowercase().as_str() {
                    "minute" | "min" => ("m", 60),
                    "hour" | "hr" => ("h", 3_600),
                    "day" => ("d", 86_400),
                    "week" => ("w", 604_800),
                    "month" => ("mo", 2_592_000),
                    _ => return None,
                };
                let range = TimeRange::new(format!("{count}{suffix}"), count.saturating_mul(unit_secs));
                Some(entity(text, whole.start(), whole.end(), EntityValue::TimeRange(range), self, RANGE_CONFIDENCE))
            }
            Rule::NamedRange => {
                let whole = caps.get(0)?;
                let normalized: Vec<String> = whole
                    .as_str()
                    .split_whitespace()
                    .map(|w| w.to_lowercase())
                    .collect();
                let range = match normalized.join(" ").as_str() {
                    "today" => TimeRange::new("today", 86_400),
                    "yesterday" => TimeRange::new("yesterday", 86_400),
                    "this week" => TimeRange::new("1w", 604_800),
                    "this month" => TimeRange::new("1mo", 2_592_000),
                    _ => return None,
                };
                Some(entity(text, whole.start(), whole.end(), EntityValue::TimeRange(range), self, RANGE_CONFIDENCE))
            }
            Rule::Device => {
                let whole = caps.get(0)?;
                let prefix = device_prefix(caps.get(1)?.as_str())?;
                let id = caps.get(2)?.as_str().to_uppercase();
                let value = EntityValue::Text(format!("{prefix}-{id}"));
                Some(entity(text, whole.start(), whole.end(), value, self, DEVICE_CONFIDENCE))
            }
            Rule::Location => {
                let whole = caps.get(0)?;
                let kind = capitalize(&caps.get(1)?.as_str().to_lowercase());
                let id = caps.get(2)?.as_str().to_uppercase();
                let value = EntityValue::Text(format!("{kind} {id}"));
                Some(entity(text, whole.start(), whole.end(), value, self, LOCATION_CONFIDENCE))
            }
            Rule::ModeSwitch => {
                let state = caps.get(1)?;
                let value = EntityValue::Enum(state.as_str().to_lowercase());
                Some(entity(text, state.start(), state.end(), value, self, MODE_SWITCH_CONFIDENCE))
            }
            Rule::Quantity => {
                let number = caps.get(1)?;
                let value = number.as_str().parse::<f64>().ok()?;
                let unit_match = caps.get(2);
                let unit = unit_match.and_then(|m| Unit::parse(m.as_str()));
                let end = match (unit_match, unit) {
                    (Some(m), Some(_)) => m.end(),
                    _ => number.end(),
                };
                let confidence = if unit.is_some() {
                    QUANTITY_WITH_UNIT_CONFIDENCE
                } else {
                    QUANTITY_CONFIDENCE
                };
                let value = EntityValue::Quantity(Quantity { value, unit });
                Some(entity(text, number.start(), end, value, self, confidence))
            }
            Rule::Vocabulary { canonical, .. } => {
                let whole = caps.get(0)?;
                let value = EntityValue::Enum((*canonical).to_string());
                Some(entity(text, whole.start(), whole.end(), value, self, VOCABULARY_CONFIDENCE))
            }
        }
    }
}

fn entity(
    text: &str,
    start: usize,
    end: usize,
    value: EntityValue,
    rule: &Rule,
    confidence: f64,
) -> Entity {
    Entity::new(
        rule.entity_type(),
        value,
        text[start..end].to_string(),
        Span::new(start, end),
        confidence,
    )
}

fn device_prefix(raw: &str) -> Option<&'static str> {
    let normalized: Vec<String> = raw.split_whitespace().map(|w| w.to_lowercase()).collect();
    let prefix = match normalized.join(" ").as_str() {
        "ahu" => "AHU",
        "fcu" => "FCU",
        "vav" => "VAV",
        "rtu" => "RTU",
        "crac" => "CRAC",
        "chiller" => "CHILLER",
        "boiler" => "BOILER",
        "pump" => "PUMP",
        "fan" => "FAN",
        "ct" | "cooling tower" => "CT",
        "hp" | "heat pump" => "HP",
        _ => return None,
    };
    Some(prefix)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Extract entities from user input
///
/// Identifies time ranges, devices, locations, quantities and HVAC vocabulary.
pub struct EntityExtractor {
    extractors: Vec<(Regex, Rule)>, // priority order
}

impl EntityExtractor {
    pub fn new() -> Self {
        // Compile regex patterns once - these should never fail
        let mut extractors = vec![
            (
                Regex::new(r"(?i)\b(?:last|past|previous)\s+(?:(\d{1,4})\s+)?(minute|min|hour|hr|day|week|month)s?\b")
                    .expect("Invalid regex pattern"),
                Rule::RelativeRange,
            ),
            (
                Regex::new(r"(?i)\b(?:today|yesterday|this\s+week|this\s+month)\b").expect("Invalid regex pattern"),
                Rule::NamedRange,
            ),
            (
                Regex::new(r"(?i)\b(ahu|fcu|vav|rtu|crac|chiller|boiler|pump|fan|cooling\s+tower|ct|heat\s+pump|hp)[-_ ]?(\d{1,4}[a-z]?)\b")
                    .expect("Invalid regex pattern"),
                Rule::Device,
            ),
            (
                Regex::new(r"(?i)\b(zone|floor|room|building|level|wing|area)\s+(\d{1,4}|[a-z]\d{0,3})\b")
                    .expect("Invalid regex pattern"),
                Rule::Location,
            ),
            (
                Regex::new(r"(?i)\b(?:turn|switch|power)\s+(?:it\s+)?(on|off)\b").expect("Invalid regex pattern"),
                Rule::ModeSwitch,
            ),
            (
                Regex::new(r"(?i)\b(on|off)\W*$").expect("Invalid regex pattern"),
                Rule::ModeSwitch,
            ),
            // Units are tried longest spelling first
            (
                Regex::new(
                    r"(?i)(?:^|[^\w.])(-?\d+(?:\.\d+)?)\s*(°\s*[cf]\b|°|degrees?\s+(?:celsius|fahrenheit|c|f)\b|degrees?\b|deg\s*[cf]\b|celsius\b|fahrenheit\b|percent\b|%|kpa\b|pa\b|ppm\b|kwh\b|kw\b|cfm\b|[cf]\b)?",
                )
                .expect("Invalid regex pattern"),
                Rule::Quantity,
            ),
        ];

        let vocabulary: &[(&str, EntityType, &'static str)] = &[
            (r"relative\s+humidity|humidity|rh", EntityType::Metric, "humidity"),
            (r"temperatures?|temps?", EntityType::Metric, "temperature"),
            (r"static\s+pressure|pressure", EntityType::Metric, "pressure"),
            (r"co2|carbon\s+dioxide|air\s+quality", EntityType::Metric, "co2"),
            (r"energy|power\s+consumption|consumption", EntityType::Metric, "energy"),
            (r"air\s*flow", EntityType::Metric, "airflow"),
            (r"fan\s+only", EntityType::Mode, "fan_only"),
            (r"cooling|cool", EntityType::Mode, "cool"),
            (r"heating|heat", EntityType::Mode, "heat"),
            (r"automatic|auto", EntityType::Mode, "auto"),
            (r"economy|economizer|eco", EntityType::Mode, "eco"),
            (r"standby", EntityType::Mode, "standby"),
            (r"off", EntityType::Mode, "off"),
            (r"critical|emergency", EntityType::Severity, "critical"),
            (r"major", EntityType::Severity, "major"),
            (r"warnings?", EntityType::Severity, "warning"),
            (r"minor", EntityType::Severity, "minor"),
            (r"informational|info", EntityType::Severity, "info"),
        ];
        for (pattern, entity_type, canonical) in vocabulary {
            extractors.push((
                Regex::new(&format!(r"(?i)\b(?:{pattern})\b")).expect("Invalid regex pattern"),
                Rule::Vocabulary {
                    entity_type: *entity_type,
                    canonical: *canonical,
                },
            ));
        }

        Self { extractors }
    }

    /// Extract entities, ordered by position in `text`.
    ///
    /// Never fails; text with nothing recognizable yields an empty list.
    /// A match that cannot be normalized (e.g. "last 0 hours") still claims
    /// its text, so later extractors do not pick it apart.
    pub fn extract(&self, text: &str) -> Vec<Entity> {
        let mut accepted: Vec<Entity> = Vec::new();
        let mut claimed: Vec<Span> = Vec::new();

        for (pattern, rule) in &self.extractors {
            for caps in pattern.captures_iter(text) {
                let Some(whole) = caps.get(0) else {
                    continue;
                };
                let whole = Span::new(whole.start(), whole.end());
                if claimed.iter().any(|span| span.overlaps(&whole)) {
                    continue;
                }
                let Some(candidate) = rule.apply(&caps, text) else {
                    claimed.push(whole);
                    continue;
                };
                if candidate.span.start >= candidate.span.end {
                    continue;
                }
                if accepted.iter().any(|e| e.span.overlaps(&candidate.span)) {
                    continue;
                }
                accepted.push(candidate);
            }
        }

        accepted.sort_by_key(|e| e.span);
        accepted
    }

    /// Every entity type some extractor can emit
    pub fn producible_types(&self) -> BTreeSet<EntityType> {
        self.extractors.iter().map(|(_, rule)| rule.entity_type()).collect()
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn find(entities: &[Entity], entity_type: EntityType) -> Option<&Entity> {
        entities.iter().find(|e| e.entity_type == entity_type)
    }

    #[test]
    fn test_chart_request_entities() {
        let extractor = EntityExtractor::new();
        let entities = extractor.extract("show temperature chart for Zone A last hour");

        assert_eq!(entities.len(), 3);
        assert_eq!(find(&entities, EntityType::Metric).unwrap().text(), "temperature");
        assert_eq!(find(&entities, EntityType::Location).unwrap().text(), "Zone A");
        let range = find(&entities, EntityType::TimeRange).unwrap();
        assert_eq!(range.value, EntityValue::TimeRange(TimeRange::new("1h", 3_600)));
        assert_eq!(range.original, "last hour");
    }

    #[rstest]
    #[case("26°C")]
    #[case("26 degrees")]
    #[case("26C")]
    #[case("26 ° c")]
    #[case("26 degrees celsius")]
    fn test_celsius_normalization(#[case] input: &str) {
        let extractor = EntityExtractor::new();
        let entities = extractor.extract(&format!("set threshold to {input}"));
        let threshold = find(&entities, EntityType::Threshold).unwrap();
        assert_eq!(
            threshold.quantity(),
            Some(&Quantity {
                value: 26.0,
                unit: Some(Unit::Celsius)
            })
        );
        assert_eq!(threshold.original, input);
    }

    #[test]
    fn test_bare_number_has_no_unit() {
        let extractor = EntityExtractor::new();
        let entities = extractor.extract("set threshold to 26");
        let threshold = find(&entities, EntityType::Threshold).unwrap();
        assert_eq!(threshold.quantity().unwrap().unit, None);
        assert_eq!(threshold.quantity().unwrap().value, 26.0);
        assert!(threshold.confidence < QUANTITY_WITH_UNIT_CONFIDENCE);
    }

    #[test]
    fn test_time_range_beats_number() {
        let extractor = EntityExtractor::new();
        let entities = extractor.extract("humidity over the last 24 hours");
        assert!(find(&entities, EntityType::Threshold).is_none());
        assert_eq!(find(&entities, EntityType::TimeRange).unwrap().text(), "24h");
    }

    #[test]
    fn test_zero_length_range_is_not_a_number() {
        let extractor = EntityExtractor::new();
        let entities = extractor.extract("humidity over the last 0 hours");
        assert!(find(&entities, EntityType::TimeRange).is_none());
        assert!(find(&entities, EntityType::Threshold).is_none());
        assert_eq!(find(&entities, EntityType::Metric).unwrap().text(), "humidity");
    }

    #[test]
    fn test_device_beats_number() {
        let extractor = EntityExtractor::new();
        let entities = extractor.extract("turn ahu 1 to cooling");
        assert_eq!(find(&entities, EntityType::Device).unwrap().text(), "AHU-1");
        assert_eq!(find(&entities, EntityType::Mode).unwrap().text(), "cool");
        assert!(find(&entities, EntityType::Threshold).is_none());
    }

    #[test]
    fn test_mode_switch_variants() {
        let extractor = EntityExtractor::new();
        let on = extractor.extract("turn on FCU-12");
        assert_eq!(find(&on, EntityType::Mode).unwrap().text(), "on");
        let trailing = extractor.extract("switch VAV-3 off");
        assert_eq!(find(&trailing, EntityType::Mode).unwrap().text(), "off");
        assert_eq!(find(&trailing, EntityType::Device).unwrap().text(), "VAV-3");
    }

    #[test]
    fn test_severity_vocabulary() {
        let extractor = EntityExtractor::new();
        let entities = extractor.extract("acknowledge critical alarms on floor 3");
        assert_eq!(find(&entities, EntityType::Severity).unwrap().text(), "critical");
        assert_eq!(find(&entities, EntityType::Location).unwrap().text(), "Floor 3");
    }

    #[test]
    fn test_unrecognized_text_is_empty() {
        let extractor = EntityExtractor::new();
        assert!(extractor.extract("hello there").is_empty());
        assert!(extractor.extract("").is_empty());
    }

    #[rstest]
    #[case("show temperature chart for Zone A last hour")]
    #[case("set AHU-1 to 22.5°F please")]
    #[case("Température 26°C für Zone B")]
    #[case("-5 degrees at ct-2 today")]
    #[case("%%% 1e5 °° --")]
    fn test_spans_within_bounds(#[case] text: &str) {
        let extractor = EntityExtractor::new();
        for entity in extractor.extract(text) {
            assert!(entity.span.start < entity.span.end);
            assert!(entity.span.end <= text.len());
            assert_eq!(&text[entity.span.start..entity.span.end], entity.original);
        }
    }

    #[test]
    fn test_extraction_is_deterministic_and_non_overlapping() {
        let extractor = EntityExtractor::new();
        let text = "show humidity and temperature for AHU-2 in zone 4 past 3 days above 60%";
        let first = extractor.extract(text);
        assert_eq!(first, extractor.extract(text));
        for pair in first.windows(2) {
            assert!(pair[0].span.end <= pair[1].span.start);
        }
    }

    #[test]
    fn test_every_entity_type_is_producible() {
        let extractor = EntityExtractor::new();
        let producible = extractor.producible_types();
        for entity_type in EntityType::ALL {
            assert!(producible.contains(&entity_type), "{entity_type} not producible");
        }
    }
}
