//! Business-semantic lookup used to pick display variants
//!
//! Keys are `<namespace>.<value>`, e.g. `mode.cool` or `severity.critical`.
//! The returned token only selects a visual variant; it never changes the
//! structure of a composition.

/// Maps business states to visual semantic tokens
pub trait BusinessSemantics: Send + Sync {
    fn lookup(&self, key: &str) -> &'static str;
}

/// Token returned for keys without a mapping
pub const NEUTRAL_TOKEN: &str = "neutral";

/// Default mapping for the HVAC dashboard
#[derive(Debug, Clone, Copy, Default)]
pub struct HvacSemantics;

impl BusinessSemantics for HvacSemantics {
    fn lookup(&self, key: &str) -> &'static str {
        match key {
            "mode.cool" => "cooling",
            "mode.heat" => "heating",
            "mode.auto" | "mode.on" => "active",
            "mode.eco" | "mode.fan_only" => "efficient",
            "mode.off" | "mode.standby" => "inactive",
            "severity.critical" => "danger",
            "severity.major" => "warning",
            "severity.warning" => "warning",
            "severity.minor" => "caution",
            "severity.info" => "info",
            "metric.temperature" => "thermal",
            "metric.humidity" => "moisture",
            "metric.co2" => "air_quality",
            "metric.energy" => "energy",
            "metric.pressure" | "metric.airflow" => "airflow",
            "intent.query_status" => "info",
            "intent.acknowledge" => "success",
            "intent.set_threshold" => "caution",
            "intent.show_dashboard" => "primary",
            _ => NEUTRAL_TOKEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_keys() {
        let semantics = HvacSemantics;
        assert_eq!(semantics.lookup("severity.critical"), "danger");
        assert_eq!(semantics.lookup("mode.cool"), "cooling");
    }

    #[test]
    fn test_unknown_key_is_neutral() {
        assert_eq!(HvacSemantics.lookup("mode.turbo"), NEUTRAL_TOKEN);
    }
}
