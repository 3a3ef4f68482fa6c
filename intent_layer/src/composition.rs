//! Composition generation - from a resolved intent to a renderable layout
//!
//! Each intent maps to one static [`CompositionTemplate`]. Slot values are
//! substituted into query descriptors and component props; units travel
//! through untouched.

use crate::context::IntentContext;
use crate::error::{IntentError, Result};
use crate::registry::IntentRegistry;
use crate::semantic::{BusinessSemantics, HvacSemantics};
use crate::types::{Entity, EntityType, UserIntent};
use crate::validation::{CompositionSchema, SchemaValidator, StructuralValidator};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    Single,
    Grid,
    Dashboard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub kind: LayoutKind,
    pub columns: u32,
    /// Suggested row height in pixels
    pub row_height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Timeseries,
    Status,
    Alarms,
    Setpoint,
}

/// What the data collaborator should fetch; opaque to this crate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuery {
    pub id: String,
    pub source: DataSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub queries: Vec<DataQuery>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Name resolved by the external component catalog
    pub kind: String,
    pub props: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_binding: Option<String>,
}

/// Final artifact handed to the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentComposition {
    pub layout: LayoutConfig,
    pub data: DataConfig,
    pub components: Vec<ComponentSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationReason {
    MissingSlot,
    MissingUnit,
    Ambiguous,
    Unrecognized,
}

/// A follow-up question for the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub reason: ClarificationReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_intent: Option<UserIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_slot: Option<EntityType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<UserIntent>,
    pub prompt_text: String,
}

impl ClarificationRequest {
    pub fn missing_slot(intent: UserIntent, slot: EntityType) -> Self {
        Self {
            reason: ClarificationReason::MissingSlot,
            for_intent: Some(intent),
            missing_slot: Some(slot),
            options: Vec::new(),
            prompt_text: slot_prompt(slot).to_string(),
        }
    }

    pub fn missing_unit(intent: UserIntent, slot: EntityType, entity: &Entity) -> Self {
        let value = entity.text();
        Self {
            reason: ClarificationReason::MissingUnit,
            for_intent: Some(intent),
            missing_slot: Some(slot),
            options: Vec::new(),
            prompt_text: format!("Which unit is {value} in? For example {value}°C or {value}%."),
        }
    }

    pub fn ambiguous(first: UserIntent, second: UserIntent) -> Self {
        Self {
            reason: ClarificationReason::Ambiguous,
            for_intent: None,
            missing_slot: None,
            options: vec![first, second],
            prompt_text: format!("Did you want to {} or {}?", first.label(), second.label()),
        }
    }

    pub fn unrecognized() -> Self {
        Self {
            reason: ClarificationReason::Unrecognized,
            for_intent: None,
            missing_slot: None,
            options: Vec::new(),
            prompt_text: "Sorry, I didn't catch that. You can ask me to show a chart, check \
                          equipment status, change a mode, set a threshold or acknowledge alarms."
                .to_string(),
        }
    }
}

fn slot_prompt(slot: EntityType) -> &'static str {
    match slot {
        EntityType::Metric => "Which metric would you like to see? For example temperature, humidity or energy.",
        EntityType::Device => "Which device do you mean? For example AHU-1 or FCU-12.",
        EntityType::Mode => "Which mode should it run in? For example cool, heat, auto or off.",
        EntityType::Threshold => "What value should the threshold be set to?",
        EntityType::Location => "Which zone or floor?",
        EntityType::TimeRange => "For which time range? For example last hour or today.",
        EntityType::Severity => "Which severity? For example critical or warning.",
    }
}

/// Result of a generation attempt that did not hit a configuration fault
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Composition(ComponentComposition),
    Clarification(ClarificationRequest),
}

// ── Templates ─────────────────────────────────────────────────────────────

/// Where a prop value comes from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropSource {
    /// Slot text; prop omitted when the slot is empty
    Slot(EntityType),
    /// Slot text or a default
    SlotOr(EntityType, &'static str),
    /// Numeric value of a quantity slot
    Amount(EntityType),
    /// Normalized unit of a quantity slot
    UnitOf(EntityType),
    Literal(&'static str),
    /// Semantic token for `<namespace>.<slot text>`, or for the intent when
    /// the slot is empty
    Variant(&'static str, EntityType),
    /// Semantic token for the intent itself
    IntentVariant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropTemplate {
    pub name: &'static str,
    pub source: PropSource,
    pub required: bool,
}

const fn prop(name: &'static str, source: PropSource) -> PropTemplate {
    PropTemplate {
        name,
        source,
        required: false,
    }
}

const fn required(name: &'static str, source: PropSource) -> PropTemplate {
    PropTemplate {
        name,
        source,
        required: true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KindSource {
    Fixed(&'static str),
    /// Chart component chosen from the metric slot
    ChartForMetric,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentTemplate {
    pub kind: KindSource,
    pub binding: Option<&'static str>,
    pub props: &'static [PropTemplate],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryTemplate {
    pub id: &'static str,
    pub source: DataSource,
    /// Metric fetched regardless of the metric slot
    pub fixed_metric: Option<&'static str>,
    pub default_range: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositionTemplate {
    pub intent: UserIntent,
    pub layout: LayoutKind,
    pub columns: u32,
    pub row_height: u32,
    pub queries: &'static [QueryTemplate],
    pub components: &'static [ComponentTemplate],
}

impl CompositionTemplate {
    pub fn schema(&self) -> CompositionSchema {
        CompositionSchema {
            intent: self.intent,
            component_props: self
                .components
                .iter()
                .map(|c| c.props.iter().filter(|p| p.required).map(|p| p.name).collect())
                .collect(),
        }
    }
}

const ZONE: PropTemplate = prop("zone", PropSource::SlotOr(EntityType::Location, "all"));
const DEVICE: PropTemplate = prop("device", PropSource::Slot(EntityType::Device));

/// Chart component for a metric name
pub fn chart_kind(metric: &str) -> &'static str {
    match metric {
        "temperature" => "TemperatureRangeChart",
        "energy" => "BarChart",
        "co2" => "GaugeChart",
        _ => "LineChart",
    }
}

static BUILTIN_TEMPLATES: &[CompositionTemplate] = &[
    CompositionTemplate {
        intent: UserIntent::QueryStatus,
        layout: LayoutKind::Grid,
        columns: 2,
        row_height: 200,
        queries: &[QueryTemplate {
            id: "status",
            source: DataSource::Status,
            fixed_metric: None,
            default_range: None,
        }],
        components: &[
            ComponentTemplate {
                kind: KindSource::Fixed("StatusCard"),
                binding: Some("status"),
                props: &[
                    required("zone", PropSource::SlotOr(EntityType::Location, "all")),
                    DEVICE,
                    prop("variant", PropSource::IntentVariant),
                ],
            },
            ComponentTemplate {
                kind: KindSource::Fixed("KpiCard"),
                binding: Some("status"),
                props: &[required("title", PropSource::Literal("Equipment health")), ZONE],
            },
        ],
    },
    CompositionTemplate {
        intent: UserIntent::ControlEquipment,
        layout: LayoutKind::Single,
        columns: 1,
        row_height: 280,
        queries: &[QueryTemplate {
            id: "status",
            source: DataSource::Status,
            fixed_metric: None,
            default_range: None,
        }],
        components: &[ComponentTemplate {
            kind: KindSource::Fixed("ControlPanel"),
            binding: Some("status"),
            props: &[
                required("device", PropSource::Slot(EntityType::Device)),
                required("mode", PropSource::Slot(EntityType::Mode)),
                prop("setpoint", PropSource::Amount(EntityType::Threshold)),
                prop("unit", PropSource::UnitOf(EntityType::Threshold)),
                prop("variant", PropSource::Variant("mode", EntityType::Mode)),
            ],
        }],
    },
    CompositionTemplate {
        intent: UserIntent::ShowChart,
        layout: LayoutKind::Single,
        columns: 1,
        row_height: 320,
        queries: &[QueryTemplate {
            id: "series",
            source: DataSource::Timeseries,
            fixed_metric: None,
            default_range: Some("24h"),
        }],
        components: &[ComponentTemplate {
            kind: KindSource::ChartForMetric,
            binding: Some("series"),
            props: &[
                required("metric", PropSource::Slot(EntityType::Metric)),
                required("range", PropSource::SlotOr(EntityType::TimeRange, "24h")),
                ZONE,
                DEVICE,
                prop("variant", PropSource::Variant("metric", EntityType::Metric)),
            ],
        }],
    },
    CompositionTemplate {
        intent: UserIntent::SetThreshold,
        layout: LayoutKind::Single,
        columns: 1,
        row_height: 240,
        queries: &[QueryTemplate {
            id: "setpoint",
            source: DataSource::Setpoint,
            fixed_metric: None,
            default_range: None,
        }],
        components: &[ComponentTemplate {
            kind: KindSource::Fixed("ThresholdEditor"),
            binding: Some("setpoint"),
            props: &[
                required("value", PropSource::Amount(EntityType::Threshold)),
                required("unit", PropSource::UnitOf(EntityType::Threshold)),
                prop("metric", PropSource::Slot(EntityType::Metric)),
                DEVICE,
                ZONE,
                prop("variant", PropSource::IntentVariant),
            ],
        }],
    },
    CompositionTemplate {
        intent: UserIntent::Acknowledge,
        layout: LayoutKind::Single,
        columns: 1,
        row_height: 360,
        queries: &[QueryTemplate {
            id: "alarms",
            source: DataSource::Alarms,
            fixed_metric: None,
            default_range: None,
        }],
        components: &[ComponentTemplate {
            kind: KindSource::Fixed("AlarmList"),
            binding: Some("alarms"),
            props: &[
                required("action", PropSource::Literal("acknowledge")),
                prop("severity", PropSource::SlotOr(EntityType::Severity, "all")),
                DEVICE,
                ZONE,
                prop("variant", PropSource::Variant("severity", EntityType::Severity)),
            ],
        }],
    },
    CompositionTemplate {
        intent: UserIntent::ShowDashboard,
        layout: LayoutKind::Dashboard,
        columns: 3,
        row_height: 240,
        queries: &[
            QueryTemplate {
                id: "status",
                source: DataSource::Status,
                fixed_metric: None,
                default_range: None,
            },
            QueryTemplate {
                id: "series",
                source: DataSource::Timeseries,
                fixed_metric: Some("temperature"),
                default_range: Some("24h"),
            },
            QueryTemplate {
                id: "alarms",
                source: DataSource::Alarms,
                fixed_metric: None,
                default_range: None,
            },
        ],
        components: &[
            ComponentTemplate {
                kind: KindSource::Fixed("KpiCard"),
                binding: Some("status"),
                props: &[required("title", PropSource::Literal("Building overview")), ZONE],
            },
            ComponentTemplate {
                kind: KindSource::Fixed("TemperatureRangeChart"),
                binding: Some("series"),
                props: &[
                    required("metric", PropSource::Literal("temperature")),
                    required("range", PropSource::SlotOr(EntityType::TimeRange, "24h")),
                    ZONE,
                ],
            },
            ComponentTemplate {
                kind: KindSource::Fixed("AlarmList"),
                binding: Some("alarms"),
                props: &[
                    required("action", PropSource::Literal("review")),
                    prop("severity", PropSource::SlotOr(EntityType::Severity, "all")),
                ],
            },
            ComponentTemplate {
                kind: KindSource::Fixed("EquipmentStatusGrid"),
                binding: Some("status"),
                props: &[ZONE, prop("variant", PropSource::IntentVariant)],
            },
        ],
    },
];

/// One template per builtin intent
pub fn builtin_templates() -> Vec<CompositionTemplate> {
    BUILTIN_TEMPLATES.to_vec()
}

// ── Generator ─────────────────────────────────────────────────────────────

type Slots = BTreeMap<EntityType, Entity>;

pub struct CompositionGenerator {
    registry: IntentRegistry,
    templates: Vec<CompositionTemplate>,
    semantics: Box<dyn BusinessSemantics>,
    validator: Box<dyn SchemaValidator>,
}

impl CompositionGenerator {
    pub fn new(
        registry: IntentRegistry,
        templates: Vec<CompositionTemplate>,
        semantics: Box<dyn BusinessSemantics>,
        validator: Box<dyn SchemaValidator>,
    ) -> Self {
        Self {
            registry,
            templates,
            semantics,
            validator,
        }
    }

    pub fn template(&self, intent: UserIntent) -> Option<&CompositionTemplate> {
        self.templates.iter().find(|t| t.intent == intent)
    }

    /// Fail if a registered intent has no template.
    pub fn check_templates(&self) -> Result<()> {
        for spec in self.registry.specs() {
            if self.template(spec.intent).is_none() {
                return Err(IntentError::MissingTemplate(spec.intent));
            }
        }
        Ok(())
    }

    /// Build the composition for `intent`, or the question that blocks it.
    ///
    /// Errors only for configuration faults: a missing template or a
    /// composition the schema rejects.
    pub fn generate(
        &self,
        intent: UserIntent,
        entities: &[Entity],
        context: &IntentContext,
    ) -> Result<GenerationOutcome> {
        if intent == UserIntent::Unknown {
            return Ok(GenerationOutcome::Clarification(ClarificationRequest::unrecognized()));
        }

        let mut slots = context.effective_slots(entities);
        if let Some(spec) = self.registry.get(intent) {
            slots.retain(|slot, _| spec.accepts(*slot));
        }

        for requirement in self.registry.required_slots(intent) {
            let Some(entity) = slots.get(&requirement.slot) else {
                tracing::debug!(%intent, slot = %requirement.slot, "required slot missing");
                return Ok(GenerationOutcome::Clarification(ClarificationRequest::missing_slot(
                    intent,
                    requirement.slot,
                )));
            };
            let has_unit = entity.quantity().is_some_and(|q| q.unit.is_some());
            if requirement.needs_unit && !has_unit {
                tracing::debug!(%intent, slot = %requirement.slot, "required unit missing");
                return Ok(GenerationOutcome::Clarification(ClarificationRequest::missing_unit(
                    intent,
                    requirement.slot,
                    entity,
                )));
            }
        }

        let template = self
            .template(intent)
            .ok_or(IntentError::MissingTemplate(intent))?;
        let composition = self.build(template, &slots);

        let payload = serde_json::to_value(&composition)?;
        if let Err(errors) = self.validator.validate(&template.schema(), &payload) {
            return Err(IntentError::SchemaViolation { intent, errors });
        }

        tracing::debug!(
            %intent,
            layout = ?composition.layout.kind,
            components = composition.components.len(),
            "composition generated"
        );
        Ok(GenerationOutcome::Composition(composition))
    }

    fn build(&self, template: &CompositionTemplate, slots: &Slots) -> ComponentComposition {
        let queries = template
            .queries
            .iter()
            .map(|q| DataQuery {
                id: q.id.to_string(),
                source: q.source,
                metric: q
                    .fixed_metric
                    .map(str::to_string)
                    .or_else(|| slot_text(slots, EntityType::Metric)),
                device: slot_text(slots, EntityType::Device),
                location: slot_text(slots, EntityType::Location),
                range: slot_text(slots, EntityType::TimeRange)
                    .or_else(|| q.default_range.map(str::to_string)),
                severity: slot_text(slots, EntityType::Severity),
            })
            .collect();

        let components = template
            .components
            .iter()
            .map(|c| ComponentSpec {
                kind: match c.kind {
                    KindSource::Fixed(kind) => kind.to_string(),
                    KindSource::ChartForMetric => {
                        chart_kind(&slot_text(slots, EntityType::Metric).unwrap_or_default()).to_string()
                    }
                },
                props: self.props(template.intent, c.props, slots),
                data_binding: c.binding.map(str::to_string),
            })
            .collect();

        ComponentComposition {
            layout: LayoutConfig {
                kind: template.layout,
                columns: template.columns,
                row_height: template.row_height,
            },
            data: DataConfig { queries },
            components,
        }
    }

    fn props(&self, intent: UserIntent, templates: &[PropTemplate], slots: &Slots) -> Map<String, Value> {
        let mut props = Map::new();
        for template in templates {
            let value = match template.source {
                PropSource::Slot(slot) => slot_text(slots, slot).map(Value::String),
                PropSource::SlotOr(slot, default) => {
                    Some(Value::String(slot_text(slots, slot).unwrap_or_else(|| default.to_string())))
                }
                PropSource::Amount(slot) => slots
                    .get(&slot)
                    .and_then(Entity::quantity)
                    .map(|q| Value::from(q.value)),
                PropSource::UnitOf(slot) => slots
                    .get(&slot)
                    .and_then(Entity::quantity)
                    .and_then(|q| q.unit)
                    .map(|unit| Value::String(unit.as_str().to_string())),
                PropSource::Literal(text) => Some(Value::String(text.to_string())),
                PropSource::Variant(namespace, slot) => {
                    let key = match slot_text(slots, slot) {
                        Some(text) => format!("{namespace}.{text}"),
                        None => format!("intent.{intent}"),
                    };
                    Some(Value::String(self.semantics.lookup(&key).to_string()))
                }
                PropSource::IntentVariant => Some(Value::String(
                    self.semantics.lookup(&format!("intent.{intent}")).to_string(),
                )),
            };
            if let Some(value) = value {
                props.insert(template.name.to_string(), value);
            }
        }
        props
    }
}

impl Default for CompositionGenerator {
    fn default() -> Self {
        Self::new(
            IntentRegistry::builtin(),
            builtin_templates(),
            Box::new(HvacSemantics),
            Box::new(StructuralValidator),
        )
    }
}

fn slot_text(slots: &Slots, slot: EntityType) -> Option<String> {
    slots.get(&slot).map(Entity::text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EntityExtractor;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn context() -> IntentContext {
        IntentContext::new("s1", Utc.timestamp_opt(1_700_000_000, 0).unwrap())
    }

    fn generate(intent: UserIntent, text: &str) -> GenerationOutcome {
        let entities = EntityExtractor::new().extract(text);
        CompositionGenerator::default()
            .generate(intent, &entities, &context())
            .unwrap()
    }

    fn composition(outcome: GenerationOutcome) -> ComponentComposition {
        match outcome {
            GenerationOutcome::Composition(c) => c,
            other => panic!("Expected composition, got {other:?}"),
        }
    }

    fn clarification(outcome: GenerationOutcome) -> ClarificationRequest {
        match outcome {
            GenerationOutcome::Clarification(c) => c,
            other => panic!("Expected clarification, got {other:?}"),
        }
    }

    #[test]
    fn test_temperature_chart_for_zone() {
        let c = composition(generate(UserIntent::ShowChart, "show temperature chart for Zone A last hour"));
        assert_eq!(c.layout.kind, LayoutKind::Single);
        assert_eq!(c.components.len(), 1);
        let chart = &c.components[0];
        assert_eq!(chart.kind, "TemperatureRangeChart");
        assert_eq!(chart.props["zone"], json!("Zone A"));
        assert_eq!(chart.props["range"], json!("1h"));
        assert_eq!(chart.props["variant"], json!("thermal"));
        assert_eq!(chart.data_binding.as_deref(), Some("series"));
        assert_eq!(c.data.queries[0].range.as_deref(), Some("1h"));
        assert_eq!(c.data.queries[0].location.as_deref(), Some("Zone A"));
    }

    #[test]
    fn test_chart_defaults() {
        let c = composition(generate(UserIntent::ShowChart, "humidity"));
        let chart = &c.components[0];
        assert_eq!(chart.kind, "LineChart");
        assert_eq!(chart.props["zone"], json!("all"));
        assert_eq!(chart.props["range"], json!("24h"));
        assert!(chart.props.get("device").is_none());
    }

    #[test]
    fn test_missing_metric_asks() {
        let request = clarification(generate(UserIntent::ShowChart, "show chart"));
        assert_eq!(request.reason, ClarificationReason::MissingSlot);
        assert_eq!(request.missing_slot, Some(EntityType::Metric));
        assert_eq!(request.for_intent, Some(UserIntent::ShowChart));
    }

    #[test]
    fn test_unitless_threshold_asks_for_unit() {
        let request = clarification(generate(UserIntent::SetThreshold, "set threshold to 26"));
        assert_eq!(request.reason, ClarificationReason::MissingUnit);
        assert_eq!(request.missing_slot, Some(EntityType::Threshold));
        assert!(request.prompt_text.contains("26°C"));
    }

    #[test]
    fn test_threshold_unit_passes_through() {
        let c = composition(generate(UserIntent::SetThreshold, "set temperature threshold to 26°F"));
        let editor = &c.components[0];
        assert_eq!(editor.kind, "ThresholdEditor");
        assert_eq!(editor.props["value"], json!(26.0));
        assert_eq!(editor.props["unit"], json!("fahrenheit"));
        assert_eq!(editor.props["metric"], json!("temperature"));
    }

    #[test]
    fn test_control_uses_mode_variant() {
        let c = composition(generate(UserIntent::ControlEquipment, "turn AHU-1 to cooling"));
        let panel = &c.components[0];
        assert_eq!(panel.props["device"], json!("AHU-1"));
        assert_eq!(panel.props["mode"], json!("cool"));
        assert_eq!(panel.props["variant"], json!("cooling"));
    }

    #[test]
    fn test_dashboard_layout() {
        let c = composition(generate(UserIntent::ShowDashboard, "open the dashboard for floor 2"));
        assert_eq!(c.layout.kind, LayoutKind::Dashboard);
        assert_eq!(c.components.len(), 4);
        assert_eq!(c.data.queries.len(), 3);
        assert_eq!(c.data.queries[1].metric.as_deref(), Some("temperature"));
        assert_eq!(c.components[0].props["zone"], json!("Floor 2"));
    }

    #[test]
    fn test_status_grid_without_slots() {
        let c = composition(generate(UserIntent::QueryStatus, "status"));
        assert_eq!(c.layout.kind, LayoutKind::Grid);
        assert_eq!(c.layout.columns, 2);
        assert_eq!(c.components[0].props["variant"], json!("info"));
    }

    #[test]
    fn test_active_slots_fill_requirements() {
        let text = "temperature";
        let ctx = {
            let mut ctx = context();
            let entities = EntityExtractor::new().extract(text);
            ctx.active_slots.insert(EntityType::Metric, entities[0].clone());
            ctx
        };
        let outcome = CompositionGenerator::default()
            .generate(UserIntent::ShowChart, &[], &ctx)
            .unwrap();
        assert_eq!(composition(outcome).components[0].props["metric"], json!("temperature"));
    }

    #[test]
    fn test_slots_outside_intent_are_not_substituted() {
        let mut ctx = context();
        for entity in EntityExtractor::new().extract("critical alarms at 30% on FCU-2") {
            ctx.active_slots.insert(entity.entity_type, entity);
        }
        let entities = EntityExtractor::new().extract("show humidity");
        let outcome = CompositionGenerator::default()
            .generate(UserIntent::ShowChart, &entities, &ctx)
            .unwrap();
        let c = composition(outcome);
        let query = &c.data.queries[0];
        assert_eq!(query.metric.as_deref(), Some("humidity"));
        assert_eq!(query.device.as_deref(), Some("FCU-2"));
        assert_eq!(query.severity, None);
    }

    #[test]
    fn test_unknown_is_unrecognized() {
        let request = clarification(generate(UserIntent::Unknown, "hello"));
        assert_eq!(request.reason, ClarificationReason::Unrecognized);
    }

    #[test]
    fn test_missing_template_is_fatal() {
        let templates = builtin_templates()
            .into_iter()
            .filter(|t| t.intent != UserIntent::Acknowledge)
            .collect();
        let generator = CompositionGenerator::new(
            IntentRegistry::builtin(),
            templates,
            Box::new(HvacSemantics),
            Box::new(StructuralValidator),
        );
        assert!(matches!(
            generator.check_templates(),
            Err(IntentError::MissingTemplate(UserIntent::Acknowledge))
        ));
        let err = generator
            .generate(UserIntent::Acknowledge, &[], &context())
            .unwrap_err();
        assert!(err.is_internal_configuration());
    }

    #[test]
    fn test_schema_violation_is_fatal() {
        static BROKEN: &[ComponentTemplate] = &[ComponentTemplate {
            kind: KindSource::Fixed("KpiCard"),
            binding: Some("nowhere"),
            props: &[required("title", PropSource::Slot(EntityType::Device))],
        }];
        let mut templates = builtin_templates();
        for template in &mut templates {
            if template.intent == UserIntent::QueryStatus {
                template.components = BROKEN;
            }
        }
        let generator = CompositionGenerator::new(
            IntentRegistry::builtin(),
            templates,
            Box::new(HvacSemantics),
            Box::new(StructuralValidator),
        );
        match generator.generate(UserIntent::QueryStatus, &[], &context()) {
            Err(IntentError::SchemaViolation { intent, errors }) => {
                assert_eq!(intent, UserIntent::QueryStatus);
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert!(fields.contains(&"components[0].props.title"));
                assert!(fields.contains(&"components[0].data_binding"));
            }
            other => panic!("Expected schema violation, got {other:?}"),
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let text = "show co2 for AHU-3 in zone 2 past 2 days";
        let first = generate(UserIntent::ShowChart, text);
        let second = generate(UserIntent::ShowChart, text);
        assert_eq!(first, second);
        let c = composition(first);
        assert_eq!(
            serde_json::to_string(&c).unwrap(),
            serde_json::to_string(&composition(second)).unwrap()
        );
        assert_eq!(c.components[0].kind, "GaugeChart");
    }

    #[test]
    fn test_builtin_templates_cover_registry() {
        assert!(CompositionGenerator::default().check_templates().is_ok());
    }
}
