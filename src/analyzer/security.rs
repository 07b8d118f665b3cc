//! Security-posture analyzer.
//!
//! The one dependent analyzer: consumes the merged database, api, and
//! frontend results to compute an attack surface and evaluate security
//! controls, then runs a bounded scan of the project against a fixed
//! vulnerability-signature list. Missing or failed upstream results degrade
//! the evaluation; they never abort it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use super::{Analyzer, ComponentResult, PriorResults};
use crate::fswalk::ProjectView;

/// One entry in the fixed vulnerability-signature list.
struct Signature {
    name: &'static str,
    severity: &'static str,
    regex: Lazy<Regex>,
}

/// The bounded signature list. Deliberately small and fixed; this is a
/// posture scan, not a general SAST engine.
static SIGNATURES: [Signature; 6] = [
    Signature {
        name: "hardcoded_secret",
        severity: "critical",
        regex: Lazy::new(|| {
            Regex::new(r#"(?i)(password|secret|api_?key|token)\w*\s*[:=]\s*["'][^"']{4,}["']"#)
                .expect("valid regex")
        }),
    },
    Signature {
        name: "sql_string_concatenation",
        severity: "high",
        regex: Lazy::new(|| {
            Regex::new(r#"(?i)(SELECT|INSERT|UPDATE|DELETE)\s[^"']*["']\s*\+|f["'](SELECT|INSERT|UPDATE|DELETE)\s"#)
                .expect("valid regex")
        }),
    },
    Signature {
        name: "eval_usage",
        severity: "high",
        regex: Lazy::new(|| Regex::new(r"\beval\s*\(").expect("valid regex")),
    },
    Signature {
        name: "debug_mode_enabled",
        severity: "medium",
        regex: Lazy::new(|| {
            Regex::new(r"(?i)debug\s*=\s*True|app\.debug\s*=\s*true").expect("valid regex")
        }),
    },
    Signature {
        name: "insecure_random",
        severity: "low",
        regex: Lazy::new(|| {
            Regex::new(r"random\.random\(\)|Math\.random\(\)").expect("valid regex")
        }),
    },
    Signature {
        name: "wildcard_cors",
        severity: "medium",
        regex: Lazy::new(|| {
            Regex::new(r#"(?i)Access-Control-Allow-Origin["']?\s*[,:]\s*["']\*"#)
                .expect("valid regex")
        }),
    },
];

/// Score penalty per finding, by severity.
fn severity_penalty(severity: &str) -> f64 {
    match severity {
        "critical" => 0.15,
        "high" => 0.10,
        "medium" => 0.05,
        _ => 0.02,
    }
}

/// Analyzer for security posture. Depends on the three independent
/// analyzers.
pub struct SecurityAnalyzer;

impl SecurityAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Scan project files against the signature list.
    fn scan_signatures(
        &self,
        view: &ProjectView,
        files_observed: &mut BTreeSet<PathBuf>,
        skipped: &mut Vec<String>,
    ) -> Vec<Value> {
        let mut findings = Vec::new();

        for path in view.files() {
            let rel = view.relative(path);
            let source = match fs::read_to_string(path) {
                Ok(s) => s,
                Err(e) => {
                    skipped.push(format!("{}: {}", rel, e));
                    continue;
                }
            };
            files_observed.insert(path.clone());

            for (line_no, line) in source.lines().enumerate() {
                for sig in &SIGNATURES {
                    if sig.regex.is_match(line) {
                        findings.push(json!({
                            "signature": sig.name,
                            "severity": sig.severity,
                            "file": rel,
                            "line": line_no + 1,
                        }));
                    }
                }
            }
        }

        findings
    }
}

impl Default for SecurityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for SecurityAnalyzer {
    fn name(&self) -> &'static str {
        "security"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["database", "api", "frontend"]
    }

    fn analyze(&self, view: &ProjectView, prior: &PriorResults) -> anyhow::Result<ComponentResult> {
        let mut files_observed = BTreeSet::new();
        let mut skipped = Vec::new();

        let findings = self.scan_signatures(view, &mut files_observed, &mut skipped);

        // Upstream slices; each may be missing or Fatal.
        let api = prior.get("api").filter(|r| r.is_usable());
        let database = prior.get("database").filter(|r| r.is_usable());
        let frontend = prior.get("frontend").filter(|r| r.is_usable());
        let degraded = [("api", &api), ("database", &database), ("frontend", &frontend)]
            .iter()
            .filter(|(_, r)| r.is_none())
            .map(|(n, _)| n.to_string())
            .collect::<Vec<_>>();

        let endpoint_count = api
            .and_then(|r| r.payload_f64("endpoint_count"))
            .unwrap_or(0.0);
        let authed_count = api
            .and_then(|r| r.payload_f64("authenticated_count"))
            .unwrap_or(0.0);
        let public_endpoints = (endpoint_count - authed_count).max(0.0);
        let auth_coverage = api.and_then(|r| r.payload_f64("auth_coverage")).unwrap_or(0.0);
        let validation_coverage = api
            .and_then(|r| r.payload_f64("validation_coverage"))
            .unwrap_or(0.0);
        let has_auth_middleware = api
            .and_then(|r| r.payload.get("has_auth_middleware"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let session_handling = has_auth_middleware
            || api
                .map(|r| {
                    r.payload_array("middleware")
                        .iter()
                        .filter_map(Value::as_str)
                        .any(|m| m.to_lowercase().contains("session"))
                })
                .unwrap_or(false);

        let data_entities = database
            .and_then(|r| r.payload_f64("model_count"))
            .unwrap_or(0.0);
        let external_calls = frontend
            .map(|r| r.payload_array("api_calls").len() as f64)
            .unwrap_or(0.0);

        // Public endpoints x data-access points x external integrations,
        // squashed into [0,1] (10 fully public endpoints over 10 entities
        // saturate the scale).
        let exposure = (public_endpoints / 10.0).min(1.0)
            * ((data_entities / 10.0).min(1.0) * 0.5 + 0.5)
            * ((external_calls / 20.0).min(1.0) * 0.3 + 0.7);

        let mut score: f64 = 0.5;
        score += 0.2 * auth_coverage;
        score += 0.15 * validation_coverage;
        if has_auth_middleware {
            score += 0.1;
        }
        score -= exposure * 0.2;
        for f in &findings {
            let severity = f["severity"].as_str().unwrap_or("low");
            score -= severity_penalty(severity);
        }
        let score = score.clamp(0.0, 1.0);

        let mut payload = Map::new();
        payload.insert(
            "attack_surface".to_string(),
            json!({
                "public_endpoints": public_endpoints as u64,
                "data_entities": data_entities as u64,
                "external_calls": external_calls as u64,
                "exposure_score": exposure,
            }),
        );
        payload.insert(
            "controls".to_string(),
            json!({
                "auth_coverage": auth_coverage,
                "validation_coverage": validation_coverage,
                "auth_middleware": has_auth_middleware,
                "session_handling": session_handling,
            }),
        );
        payload.insert("finding_count".to_string(), json!(findings.len()));
        payload.insert("findings".to_string(), Value::Array(findings));
        payload.insert("security_score".to_string(), json!(score));
        if !degraded.is_empty() {
            payload.insert(
                "degraded_inputs".to_string(),
                Value::Array(degraded.iter().map(|d| json!(d)).collect()),
            );
        }

        Ok(ComponentResult::ok(
            self.name(),
            payload,
            files_observed,
            skipped,
        ))
    }
}
