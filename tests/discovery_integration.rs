//! Integration tests for the full discovery pipeline.
//!
//! These tests run the engine end to end against the storefront fixture
//! under testdata/fixture_project and assert on the merged results:
//! component payloads, recognized patterns, insights, and quality scores.

use std::path::PathBuf;

use archscout::config::DiscoveryConfig;
use archscout::orchestrator::DiscoveryEngine;
use archscout::DiscoveryResult;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join("fixture_project")
}

fn run_discovery() -> DiscoveryResult {
    let engine = DiscoveryEngine::new(DiscoveryConfig::default()).expect("valid default config");
    engine.discover(&fixture_path())
}

#[test]
fn test_all_components_analyzed() {
    let result = run_discovery();

    assert!(!result.is_fatal());
    for name in ["database", "api", "frontend", "security"] {
        let component = result
            .components
            .get(name)
            .unwrap_or_else(|| panic!("missing component {}", name));
        assert!(component.is_usable(), "{} should be usable", name);
    }
}

#[test]
fn test_database_layer_extraction() {
    let result = run_discovery();
    let db = &result.components["database"];

    assert_eq!(db.payload_f64("model_count"), Some(3.0));
    assert_eq!(db.payload_f64("relationship_count"), Some(2.0));
    assert_eq!(db.payload_f64("uuid_pk_ratio"), Some(1.0));
    // Only users carries tenant_id.
    let tenant = db.payload_f64("tenant_column_ratio").unwrap();
    assert!((tenant - 1.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_api_layer_extraction() {
    let result = run_discovery();
    let api = &result.components["api"];

    assert_eq!(api.payload_f64("endpoint_count"), Some(5.0));
    assert_eq!(api.payload_f64("authenticated_count"), Some(2.0));
    assert_eq!(api.payload_f64("auth_coverage"), Some(0.4));
    assert_eq!(api.payload_f64("validation_coverage"), Some(0.4));
}

#[test]
fn test_frontend_layer_extraction() {
    let result = run_discovery();
    let fe = &result.components["frontend"];

    assert_eq!(fe.payload_f64("component_count"), Some(4.0));
    assert_eq!(fe.payload_f64("stateful_ratio"), Some(0.5));
    assert_eq!(fe.payload_f64("typed_prop_ratio"), Some(0.5));
    assert_eq!(fe.payload_array("api_calls").len(), 2);
}

#[test]
fn test_uuid_pattern_recognized_with_high_confidence() {
    let result = run_discovery();

    let uuid = result
        .patterns
        .iter()
        .find(|p| p.name == "UUID Primary Keys")
        .expect("all-UUID schema should surface the pattern");
    assert!(uuid.confidence >= 0.8, "confidence was {}", uuid.confidence);
}

#[test]
fn test_multi_tenant_needs_corroboration() {
    let result = run_discovery();

    // A lone tenant column is one evidence class; the pattern requires two.
    assert!(
        !result.patterns.iter().any(|p| p.name == "Multi-Tenant Architecture"),
        "single evidence class must not surface multi-tenancy"
    );
}

#[test]
fn test_layered_and_component_patterns() {
    let result = run_discovery();
    let names: Vec<&str> = result.patterns.iter().map(|p| p.name.as_str()).collect();

    assert!(names.contains(&"Layered Architecture"));
    assert!(names.contains(&"Component-Based UI"));
    assert!(names.contains(&"REST API"));
}

#[test]
fn test_overall_quality_in_expected_band() {
    let result = run_discovery();

    let overall = result.quality.overall_score;
    assert!(
        overall > 0.4 && overall < 0.7,
        "fixture should score mid-band, got {}",
        overall
    );
    assert_eq!(result.quality.sub_scores.len(), 6);
}

#[test]
fn test_frontend_routes_align_with_api() {
    let result = run_discovery();

    let insight = result
        .insights
        .iter()
        .find(|i| i.kind == "frontend_route_alignment")
        .expect("fixture has both frontend calls and declared routes");
    assert!(insight.consistent);
}

#[test]
fn test_security_reports_no_findings_on_clean_fixture() {
    let result = run_discovery();
    let sec = &result.components["security"];

    assert!(sec.payload_array("findings").is_empty());
    let score = sec.payload_f64("security_score").unwrap();
    assert!(score > 0.5, "clean fixture should beat baseline, got {}", score);
}

#[test]
fn test_repeat_run_is_deterministic() {
    let engine = DiscoveryEngine::new(DiscoveryConfig::default()).expect("valid default config");
    let first = engine.discover(&fixture_path());
    let second = engine.discover(&fixture_path());

    assert_eq!(
        serde_json::to_string(&first.components).unwrap(),
        serde_json::to_string(&second.components).unwrap()
    );
    assert_eq!(
        first.quality.overall_score.to_bits(),
        second.quality.overall_score.to_bits()
    );
}
