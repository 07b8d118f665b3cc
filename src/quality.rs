//! Weighted multi-factor quality model.
//!
//! Six sub-scores, each computed independently from its relevant component
//! slice, combined by configurable weights that must sum to 1.0. A
//! sub-score whose upstream data is missing (analyzer `Fatal`) takes the
//! neutral default 0.5 so a single failed analyzer degrades the composite
//! proportionally instead of zeroing or inflating it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analyzer::{self, ComponentResult};
use crate::patterns::PatternMatch;

/// Neutral value used when a sub-score cannot be computed.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Per-metric thresholds below which a recommendation is emitted.
const RECOMMENDATION_THRESHOLDS: &[(&str, f64, &str)] = &[
    ("maintainability", 0.5, "reduce coupling between data models"),
    ("scalability", 0.5, "consider UUID keys and tenant partitioning"),
    ("security", 0.6, "increase authentication and validation coverage"),
    ("performance", 0.5, "reduce per-component API chatter"),
    ("testability", 0.5, "add test files alongside source modules"),
    ("documentation", 0.4, "add typed contracts or docstrings"),
];

/// The composite quality assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Weighted sum of the sub-scores, in [0,1].
    pub overall_score: f64,
    pub sub_scores: BTreeMap<String, f64>,
    pub weights: BTreeMap<String, f64>,
    pub recommendations: Vec<String>,
}

/// Compute quality metrics from merged component results and the detected
/// pattern list. `weights` are validated at config load and assumed to sum
/// to 1.0 here.
pub fn score(
    components: &BTreeMap<String, ComponentResult>,
    patterns: &[PatternMatch],
    weights: &BTreeMap<String, f64>,
) -> QualityMetrics {
    let usable = |name: &str| components.get(name).filter(|r| r.is_usable());

    let database = usable("database");
    let api = usable("api");
    let frontend = usable("frontend");
    let security = usable("security");

    let mut sub_scores = BTreeMap::new();

    // maintainability: coupling in the data model plus recognized-pattern
    // count. Needs the database slice.
    let maintainability = match database {
        Some(db) => {
            let models = db.payload_f64("model_count").unwrap_or(0.0);
            let relationships = db.payload_f64("relationship_count").unwrap_or(0.0);
            let density = if models > 0.0 { relationships / models } else { 0.0 };
            let coupling = 1.0 - (density / 2.0).min(1.0);
            let pattern_signal = (patterns.len() as f64 / 4.0).min(1.0);
            0.5 * coupling + 0.5 * pattern_signal
        }
        None => NEUTRAL_SCORE,
    };
    sub_scores.insert("maintainability".to_string(), clamp(maintainability));

    // scalability: key scheme and tenant readiness from the data layer,
    // endpoint breadth from the API layer.
    let scalability = match database {
        Some(db) => {
            let uuid = db.payload_f64("uuid_pk_ratio").unwrap_or(0.0);
            let tenant = db.payload_f64("tenant_column_ratio").unwrap_or(0.0);
            let endpoints = api
                .and_then(|a| a.payload_f64("endpoint_count"))
                .unwrap_or(0.0);
            0.4 * uuid + 0.3 * tenant + 0.3 * (endpoints / 20.0).min(1.0)
        }
        None => NEUTRAL_SCORE,
    };
    sub_scores.insert("scalability".to_string(), clamp(scalability));

    // security: the security analyzer's own normalized score.
    let security_score = security
        .and_then(|s| s.payload_f64("security_score"))
        .unwrap_or(NEUTRAL_SCORE);
    sub_scores.insert("security".to_string(), clamp(security_score));

    // performance: API chatter per frontend component and state pressure.
    let performance = match frontend {
        Some(fe) => {
            let components_n = fe.payload_f64("component_count").unwrap_or(0.0).max(1.0);
            let calls = fe.payload_array("api_calls").len() as f64;
            let chatter = (calls / components_n / 2.0).min(1.0);
            let stateful = fe.payload_f64("stateful_ratio").unwrap_or(0.0);
            0.5 * (1.0 - chatter) + 0.5 * (1.0 - 0.5 * stateful)
        }
        None => NEUTRAL_SCORE,
    };
    sub_scores.insert("performance".to_string(), clamp(performance));

    // testability: test files in the observed set plus request validation.
    let testability = match api {
        Some(a) => {
            let validation = a.payload_f64("validation_coverage").unwrap_or(0.0);
            let test_ratio = analyzer::test_file_ratio(components);
            0.7 * test_ratio + 0.3 * validation
        }
        None => NEUTRAL_SCORE,
    };
    sub_scores.insert("testability".to_string(), clamp(testability));

    // documentation: typed contracts as a documentation proxy.
    let documentation = match frontend {
        Some(fe) => {
            let typed = fe.payload_f64("typed_prop_ratio").unwrap_or(0.0);
            let validation = api
                .and_then(|a| a.payload_f64("validation_coverage"))
                .unwrap_or(0.0);
            0.6 * typed + 0.4 * validation
        }
        None => NEUTRAL_SCORE,
    };
    sub_scores.insert("documentation".to_string(), clamp(documentation));

    let overall_score = weights
        .iter()
        .map(|(name, w)| w * sub_scores.get(name).copied().unwrap_or(NEUTRAL_SCORE))
        .sum::<f64>();

    let mut recommendations = Vec::new();
    for (metric, threshold, advice) in RECOMMENDATION_THRESHOLDS {
        if let Some(value) = sub_scores.get(*metric) {
            if value < threshold {
                recommendations.push(format!("{} is {:.2}: {}", metric, value, advice));
            }
        }
    }

    QualityMetrics {
        overall_score: clamp(overall_score),
        sub_scores,
        weights: weights.clone(),
        recommendations,
    }
}

fn clamp(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::ComponentResult;
    use crate::config::default_quality_weights;
    use serde_json::{json, Map, Value};
    use std::collections::BTreeSet;

    fn component(name: &str, fields: &[(&str, Value)]) -> ComponentResult {
        let mut payload = Map::new();
        for (k, v) in fields {
            payload.insert(k.to_string(), v.clone());
        }
        ComponentResult::ok(name, payload, BTreeSet::new(), Vec::new())
    }

    fn full_components() -> BTreeMap<String, ComponentResult> {
        let mut components = BTreeMap::new();
        components.insert(
            "database".to_string(),
            component(
                "database",
                &[
                    ("model_count", json!(4)),
                    ("relationship_count", json!(2)),
                    ("uuid_pk_ratio", json!(1.0)),
                    ("tenant_column_ratio", json!(0.5)),
                ],
            ),
        );
        components.insert(
            "api".to_string(),
            component(
                "api",
                &[
                    ("endpoint_count", json!(6)),
                    ("validation_coverage", json!(0.5)),
                ],
            ),
        );
        components.insert(
            "frontend".to_string(),
            component(
                "frontend",
                &[
                    ("component_count", json!(4)),
                    ("stateful_ratio", json!(0.5)),
                    ("typed_prop_ratio", json!(0.75)),
                    ("api_calls", json!(["/api/a", "/api/b"])),
                ],
            ),
        );
        components.insert(
            "security".to_string(),
            component("security", &[("security_score", json!(0.8))]),
        );
        components
    }

    #[test]
    fn test_overall_equals_weighted_sum() {
        let components = full_components();
        let weights = default_quality_weights();
        let metrics = score(&components, &[], &weights);

        let expected: f64 = weights
            .iter()
            .map(|(k, w)| w * metrics.sub_scores[k])
            .sum();
        assert!((metrics.overall_score - expected).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&metrics.overall_score));
        assert_eq!(metrics.sub_scores.len(), 6);
    }

    #[test]
    fn test_security_subscore_passthrough() {
        let components = full_components();
        let metrics = score(&components, &[], &default_quality_weights());
        assert!((metrics.sub_scores["security"] - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_fatal_database_yields_neutral_maintainability() {
        let mut components = full_components();
        components.insert(
            "database".to_string(),
            ComponentResult::fatal("database", "timeout".to_string()),
        );

        let metrics = score(&components, &[], &default_quality_weights());
        assert!((metrics.sub_scores["maintainability"] - NEUTRAL_SCORE).abs() < 1e-9);
        assert!((metrics.sub_scores["scalability"] - NEUTRAL_SCORE).abs() < 1e-9);
    }

    #[test]
    fn test_degradation_shifts_overall_by_weighted_delta() {
        let components = full_components();
        let weights = default_quality_weights();
        let baseline = score(&components, &[], &weights);

        let mut degraded_components = components.clone();
        degraded_components.insert(
            "database".to_string(),
            ComponentResult::fatal("database", "timeout".to_string()),
        );
        let degraded = score(&degraded_components, &[], &weights);

        let expected_shift = weights["maintainability"]
            * (NEUTRAL_SCORE - baseline.sub_scores["maintainability"])
            + weights["scalability"] * (NEUTRAL_SCORE - baseline.sub_scores["scalability"]);
        let actual_shift = degraded.overall_score - baseline.overall_score;
        assert!(
            (actual_shift - expected_shift).abs() < 1e-9,
            "shift {} != expected {}",
            actual_shift,
            expected_shift
        );
    }

    #[test]
    fn test_all_fatal_gives_all_neutral() {
        let mut components = BTreeMap::new();
        for name in ["database", "api", "frontend", "security"] {
            components.insert(
                name.to_string(),
                ComponentResult::fatal(name, "boom".to_string()),
            );
        }
        let metrics = score(&components, &[], &default_quality_weights());

        for (name, value) in &metrics.sub_scores {
            assert!(
                (value - NEUTRAL_SCORE).abs() < 1e-9,
                "{} should be neutral, got {}",
                name,
                value
            );
        }
        assert!((metrics.overall_score - NEUTRAL_SCORE).abs() < 1e-9);
    }

    #[test]
    fn test_recommendations_for_low_scores() {
        let mut components = BTreeMap::new();
        components.insert(
            "api".to_string(),
            component(
                "api",
                &[("endpoint_count", json!(2)), ("validation_coverage", json!(0.0))],
            ),
        );
        let metrics = score(&components, &[], &default_quality_weights());

        // testability computed from a usable api slice with no tests.
        assert!(metrics.sub_scores["testability"] < 0.5);
        assert!(metrics
            .recommendations
            .iter()
            .any(|r| r.starts_with("testability")));
    }
}
