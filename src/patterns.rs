//! Heuristic architecture-pattern recognition.
//!
//! Builds a feature vector from the merged component results and scores it
//! against a static knowledge base. Every match carries a confidence in
//! [0,1] and the evidence that produced it. A present signal contributes
//! its full weight; a partially-present signal contributes proportionally.
//! Multi-tenancy additionally requires two independent evidence classes so
//! a single coincidental column name cannot cross the threshold.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::analyzer::{self, ComponentResult};

/// Features derived read-only from the merged component results.
/// Recomputed every run, never cached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    pub features: BTreeMap<String, f64>,
}

impl FeatureVector {
    /// Value of a feature, 0.0 when absent.
    pub fn get(&self, name: &str) -> f64 {
        self.features.get(name).copied().unwrap_or(0.0)
    }

    fn set(&mut self, name: &str, value: f64) {
        self.features.insert(name.to_string(), value);
    }
}

/// A detected architecture pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub name: String,
    /// How strongly the evidence supports the pattern, in [0,1].
    pub confidence: f64,
    /// Human-readable signals that contributed.
    pub evidence: Vec<String>,
    /// Mean strength of the contributing signals, in [0,1].
    pub implementation_quality: f64,
}

/// One required signal in a pattern definition.
struct Signal {
    feature: &'static str,
    weight: f64,
    /// Feature value at which the signal counts as fully present.
    expected: f64,
}

/// A named evidence class; the signal must be strictly positive to count.
struct EvidenceClass {
    label: &'static str,
    feature: &'static str,
}

/// One entry in the static pattern knowledge base.
struct PatternDefinition {
    name: &'static str,
    signals: &'static [Signal],
    evidence_classes: &'static [EvidenceClass],
    /// Distinct evidence classes required for a match to be admissible.
    min_evidence_classes: usize,
}

/// The static knowledge base. Thresholds are heuristics, not calibrated
/// constants; the reporting threshold itself comes from configuration.
static KNOWLEDGE_BASE: &[PatternDefinition] = &[
    PatternDefinition {
        name: "Multi-Tenant Architecture",
        signals: &[
            Signal { feature: "tenant_column_ratio", weight: 0.4, expected: 0.6 },
            Signal { feature: "rls_policies", weight: 0.3, expected: 1.0 },
            Signal { feature: "tenant_middleware", weight: 0.3, expected: 1.0 },
        ],
        evidence_classes: &[
            EvidenceClass { label: "schema tenant columns", feature: "tenant_column_ratio" },
            EvidenceClass { label: "row-level-security policies", feature: "rls_policies" },
            EvidenceClass { label: "tenant-aware middleware", feature: "tenant_middleware" },
        ],
        min_evidence_classes: 2,
    },
    PatternDefinition {
        name: "UUID Primary Keys",
        signals: &[Signal { feature: "uuid_pk_ratio", weight: 1.0, expected: 1.0 }],
        evidence_classes: &[],
        min_evidence_classes: 0,
    },
    PatternDefinition {
        name: "Soft-Delete Pattern",
        signals: &[Signal { feature: "soft_delete_ratio", weight: 1.0, expected: 0.5 }],
        evidence_classes: &[],
        min_evidence_classes: 0,
    },
    PatternDefinition {
        name: "REST API",
        signals: &[
            Signal { feature: "endpoints", weight: 0.6, expected: 5.0 },
            Signal { feature: "auth_coverage", weight: 0.2, expected: 0.5 },
            Signal { feature: "validation_coverage", weight: 0.2, expected: 0.5 },
        ],
        evidence_classes: &[],
        min_evidence_classes: 0,
    },
    PatternDefinition {
        name: "Repository Pattern",
        signals: &[
            Signal { feature: "models", weight: 0.5, expected: 3.0 },
            Signal { feature: "relationship_density", weight: 0.5, expected: 1.0 },
        ],
        evidence_classes: &[],
        min_evidence_classes: 0,
    },
    PatternDefinition {
        name: "Layered Architecture",
        signals: &[
            Signal { feature: "models", weight: 0.33, expected: 1.0 },
            Signal { feature: "endpoints", weight: 0.33, expected: 1.0 },
            Signal { feature: "components", weight: 0.34, expected: 1.0 },
        ],
        evidence_classes: &[],
        min_evidence_classes: 0,
    },
    PatternDefinition {
        name: "Component-Based UI",
        signals: &[
            Signal { feature: "components", weight: 0.6, expected: 4.0 },
            Signal { feature: "stateful_ratio", weight: 0.2, expected: 0.5 },
            Signal { feature: "typed_prop_ratio", weight: 0.2, expected: 0.5 },
        ],
        evidence_classes: &[],
        min_evidence_classes: 0,
    },
];

/// Build the feature vector from merged component results.
pub fn extract_features(components: &BTreeMap<String, ComponentResult>) -> FeatureVector {
    let mut fv = FeatureVector::default();

    let usable = |name: &str| components.get(name).filter(|r| r.is_usable());

    if let Some(db) = usable("database") {
        let models = db.payload_f64("model_count").unwrap_or(0.0);
        let relationships = db.payload_f64("relationship_count").unwrap_or(0.0);
        fv.set("models", models);
        fv.set("relationships", relationships);
        fv.set(
            "relationship_density",
            if models > 0.0 { relationships / models } else { 0.0 },
        );
        fv.set(
            "tenant_column_ratio",
            db.payload_f64("tenant_column_ratio").unwrap_or(0.0),
        );
        fv.set("uuid_pk_ratio", db.payload_f64("uuid_pk_ratio").unwrap_or(0.0));
        fv.set(
            "soft_delete_ratio",
            db.payload_f64("soft_delete_ratio").unwrap_or(0.0),
        );
        fv.set(
            "rls_policies",
            db.payload_f64("rls_policy_count").unwrap_or(0.0),
        );
    }

    if let Some(api) = usable("api") {
        fv.set("endpoints", api.payload_f64("endpoint_count").unwrap_or(0.0));
        fv.set("auth_coverage", api.payload_f64("auth_coverage").unwrap_or(0.0));
        fv.set(
            "validation_coverage",
            api.payload_f64("validation_coverage").unwrap_or(0.0),
        );
        let tenant_middleware = api
            .payload_array("middleware")
            .iter()
            .filter_map(Value::as_str)
            .any(|m| m.to_lowercase().contains("tenant"));
        fv.set("tenant_middleware", tenant_middleware as u8 as f64);
    }

    if let Some(fe) = usable("frontend") {
        fv.set(
            "components",
            fe.payload_f64("component_count").unwrap_or(0.0),
        );
        fv.set(
            "stateful_ratio",
            fe.payload_f64("stateful_ratio").unwrap_or(0.0),
        );
        fv.set(
            "typed_prop_ratio",
            fe.payload_f64("typed_prop_ratio").unwrap_or(0.0),
        );
        fv.set("frontend_api_calls", fe.payload_array("api_calls").len() as f64);
    }

    if let Some(sec) = usable("security") {
        fv.set(
            "security_score",
            sec.payload_f64("security_score").unwrap_or(0.5),
        );
        fv.set("finding_count", sec.payload_f64("finding_count").unwrap_or(0.0));
    }

    // Coupling/consistency proxy between declared routes and frontend calls.
    if let Some(ratio) = route_consistency(components) {
        fv.set("route_consistency", ratio);
    }

    // Test-coverage signal from the observed file set.
    fv.set("test_file_ratio", analyzer::test_file_ratio(components));

    fv
}

/// Fraction of frontend API calls that resolve to a declared route.
/// None when either side is missing or the frontend makes no calls.
pub fn route_consistency(components: &BTreeMap<String, ComponentResult>) -> Option<f64> {
    let api = components.get("api").filter(|r| r.is_usable())?;
    let fe = components.get("frontend").filter(|r| r.is_usable())?;

    let calls: Vec<&str> = fe
        .payload_array("api_calls")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    if calls.is_empty() {
        return None;
    }

    let routes: Vec<String> = api
        .payload_array("endpoints")
        .iter()
        .filter_map(|e| e["path"].as_str())
        .map(normalize_route)
        .collect();

    let matched = calls
        .iter()
        .filter(|call| {
            let call = normalize_route(call);
            routes.iter().any(|r| *r == call || call.starts_with(r))
        })
        .count();

    Some(matched as f64 / calls.len() as f64)
}

/// Strip parameter segments so `/users/:id` and `/users/{id}` compare equal
/// to a concrete call path's prefix.
fn normalize_route(path: &str) -> String {
    path.split('/')
        .take_while(|seg| !seg.starts_with(':') && !seg.starts_with('{') && !seg.starts_with('<'))
        .collect::<Vec<_>>()
        .join("/")
}

/// Score the feature vector against the knowledge base.
///
/// Matches below `confidence_threshold` are discarded. The result is sorted
/// descending by confidence, ties broken by name for determinism.
pub fn recognize(
    components: &BTreeMap<String, ComponentResult>,
    confidence_threshold: f64,
) -> Vec<PatternMatch> {
    let fv = extract_features(components);
    recognize_from_features(&fv, confidence_threshold)
}

/// Same as [`recognize`], for callers that already extracted features.
pub fn recognize_from_features(fv: &FeatureVector, confidence_threshold: f64) -> Vec<PatternMatch> {
    let mut matches = Vec::new();

    for def in KNOWLEDGE_BASE {
        let mut weight_sum = 0.0;
        let mut score_sum = 0.0;
        let mut contributing = Vec::new();
        let mut evidence = Vec::new();

        for signal in def.signals {
            let value = fv.get(signal.feature);
            let strength = if signal.expected > 0.0 {
                (value / signal.expected).min(1.0)
            } else {
                0.0
            };
            weight_sum += signal.weight;
            score_sum += signal.weight * strength;
            if strength > 0.0 {
                contributing.push(strength);
                evidence.push(format!("{} = {:.2}", signal.feature, value));
            }
        }

        let confidence = if weight_sum > 0.0 { score_sum / weight_sum } else { 0.0 };

        let classes_present = def
            .evidence_classes
            .iter()
            .filter(|c| fv.get(c.feature) > 0.0)
            .count();
        if classes_present < def.min_evidence_classes {
            continue;
        }
        for class in def.evidence_classes {
            if fv.get(class.feature) > 0.0 {
                evidence.push(class.label.to_string());
            }
        }

        if confidence < confidence_threshold {
            continue;
        }

        let implementation_quality = if contributing.is_empty() {
            0.0
        } else {
            contributing.iter().sum::<f64>() / contributing.len() as f64
        };

        matches.push(PatternMatch {
            name: def.name.to_string(),
            confidence,
            evidence,
            implementation_quality,
        });
    }

    matches.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });

    matches
}
