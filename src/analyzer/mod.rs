//! Pluggable analyzers and their result types.
//!
//! Each analyzer inspects one architectural facet of a project and produces
//! a [`ComponentResult`]. Three of them (database, api, frontend) are
//! independent; the security analyzer consumes their merged output. Dispatch
//! goes through a fixed compiled-in registry rather than any dynamic
//! loading.
//!
//! # Adding an Analyzer
//!
//! Implement [`Analyzer`], add a constructor to `REGISTRY` below, and list
//! upstream analyzers in `dependencies()` if it needs their results.

mod api;
mod database;
mod frontend;
mod security;

pub use api::ApiAnalyzer;
pub use database::DatabaseAnalyzer;
pub use frontend::FrontendAnalyzer;
pub use security::SecurityAnalyzer;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::fswalk::ProjectView;

/// Outcome class of a single analyzer invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerStatus {
    /// Completed with no skipped files.
    Ok,
    /// Completed, but some files could not be parsed.
    Partial,
    /// Timed out, panicked, or failed as a whole.
    Fatal,
}

impl std::fmt::Display for AnalyzerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalyzerStatus::Ok => write!(f, "ok"),
            AnalyzerStatus::Partial => write!(f, "partial"),
            AnalyzerStatus::Fatal => write!(f, "fatal"),
        }
    }
}

/// The output of exactly one analyzer invocation.
///
/// Never mutated after construction; the orchestrator clones on merge and
/// the cache holds its own copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentResult {
    pub analyzer: String,
    pub status: AnalyzerStatus,
    /// Analyzer-specific findings, JSON-shaped for stable serialization.
    pub payload: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration, recorded by the sandbox runner.
    pub duration_ms: u64,
    /// Every file the analyzer read, for cache invalidation.
    pub files_observed: BTreeSet<PathBuf>,
    /// Per-file parse failures. Notes, never errors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_files: Vec<String>,
}

impl ComponentResult {
    /// A successful result. Status degrades to `Partial` if any files were
    /// skipped.
    pub fn ok(
        analyzer: &str,
        payload: Map<String, Value>,
        files_observed: BTreeSet<PathBuf>,
        skipped_files: Vec<String>,
    ) -> Self {
        let status = if skipped_files.is_empty() {
            AnalyzerStatus::Ok
        } else {
            AnalyzerStatus::Partial
        };
        Self {
            analyzer: analyzer.to_string(),
            status,
            payload,
            error: None,
            duration_ms: 0,
            files_observed,
            skipped_files,
        }
    }

    /// A whole-analyzer failure (timeout, panic, or returned error).
    pub fn fatal(analyzer: &str, error: String) -> Self {
        Self {
            analyzer: analyzer.to_string(),
            status: AnalyzerStatus::Fatal,
            payload: Map::new(),
            error: Some(error),
            duration_ms: 0,
            files_observed: BTreeSet::new(),
            skipped_files: Vec::new(),
        }
    }

    /// Whether downstream consumers can rely on the payload.
    pub fn is_usable(&self) -> bool {
        self.status != AnalyzerStatus::Fatal
    }

    /// Fetch a numeric payload field, if present.
    pub fn payload_f64(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(Value::as_f64)
    }

    /// Fetch an array payload field, defaulting to empty.
    pub fn payload_array(&self, key: &str) -> &[Value] {
        self.payload
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Merged results from upstream analyzers, keyed by analyzer name.
pub type PriorResults = BTreeMap<String, ComponentResult>;

/// Fraction of files observed by usable results whose name marks a test
/// file. Zero when nothing was observed.
pub fn test_file_ratio(components: &PriorResults) -> f64 {
    let (tests, total) = components
        .values()
        .filter(|r| r.is_usable())
        .flat_map(|r| r.files_observed.iter())
        .fold((0usize, 0usize), |(tests, total), path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let is_test =
                name.contains("test") || name.contains("spec") || name.starts_with("conftest");
            (tests + is_test as usize, total + 1)
        });
    if total == 0 {
        0.0
    } else {
        tests as f64 / total as f64
    }
}

/// One architectural-facet analyzer.
///
/// Implementations must be pure readers of the [`ProjectView`]: no writes
/// to the project tree, no side effects visible to sibling analyzers. A
/// returned `Err` becomes a `Fatal` result at the sandbox boundary;
/// per-file trouble belongs in `skipped_files` instead.
pub trait Analyzer: Send + Sync {
    /// Stable analyzer name used for registry lookup, cache keys, and
    /// result maps.
    fn name(&self) -> &'static str;

    /// Names of analyzers whose results must be available in `prior`.
    /// Empty for independent analyzers.
    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    /// Inspect the project and produce a result.
    fn analyze(&self, view: &ProjectView, prior: &PriorResults)
        -> anyhow::Result<ComponentResult>;
}

type AnalyzerCtor = fn() -> Box<dyn Analyzer>;

/// Fixed compiled-in registry, name -> constructor. Order is the dispatch
/// order: independent analyzers first, dependent ones after.
static REGISTRY: Lazy<Vec<(&'static str, AnalyzerCtor)>> = Lazy::new(|| {
    vec![
        ("database", || Box::new(DatabaseAnalyzer::new())),
        ("api", || Box::new(ApiAnalyzer::new())),
        ("frontend", || Box::new(FrontendAnalyzer::new())),
        ("security", || Box::new(SecurityAnalyzer::new())),
    ]
});

/// Construct a registered analyzer by name.
pub fn create_analyzer(name: &str) -> Option<Box<dyn Analyzer>> {
    REGISTRY
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, ctor)| ctor())
}

/// Names of all registered analyzers, in dispatch order.
pub fn analyzer_names() -> Vec<&'static str> {
    REGISTRY.iter().map(|(n, _)| *n).collect()
}

/// Names of analyzers with no dependencies (the parallel phase).
pub fn independent_analyzers() -> Vec<&'static str> {
    REGISTRY
        .iter()
        .filter(|(_, ctor)| ctor().dependencies().is_empty())
        .map(|(n, _)| *n)
        .collect()
}

/// Names of analyzers with dependencies (the dependent phase).
pub fn dependent_analyzers() -> Vec<&'static str> {
    REGISTRY
        .iter()
        .filter(|(_, ctor)| !ctor().dependencies().is_empty())
        .map(|(n, _)| *n)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contains_all_four() {
        let names = analyzer_names();
        assert_eq!(names, vec!["database", "api", "frontend", "security"]);

        for name in names {
            assert!(create_analyzer(name).is_some(), "missing {}", name);
        }
        assert!(create_analyzer("quantum").is_none());
    }

    #[test]
    fn test_phase_split() {
        assert_eq!(independent_analyzers(), vec!["database", "api", "frontend"]);
        assert_eq!(dependent_analyzers(), vec!["security"]);
    }

    #[test]
    fn test_security_declares_upstream_dependencies() {
        let security = create_analyzer("security").unwrap();
        let deps = security.dependencies();
        assert!(deps.contains(&"database"));
        assert!(deps.contains(&"api"));
        assert!(deps.contains(&"frontend"));
    }

    #[test]
    fn test_result_status_from_skips() {
        let clean = ComponentResult::ok("database", Map::new(), BTreeSet::new(), Vec::new());
        assert_eq!(clean.status, AnalyzerStatus::Ok);
        assert!(clean.is_usable());

        let partial = ComponentResult::ok(
            "database",
            Map::new(),
            BTreeSet::new(),
            vec!["models/bad.py: invalid UTF-8".to_string()],
        );
        assert_eq!(partial.status, AnalyzerStatus::Partial);
        assert!(partial.is_usable());

        let fatal = ComponentResult::fatal("database", "timeout".to_string());
        assert_eq!(fatal.status, AnalyzerStatus::Fatal);
        assert!(!fatal.is_usable());
        assert_eq!(fatal.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_test_file_ratio_over_usable_results() {
        let mut components = PriorResults::new();
        assert_eq!(test_file_ratio(&components), 0.0);

        let mut observed = BTreeSet::new();
        observed.insert(PathBuf::from("/p/app.py"));
        observed.insert(PathBuf::from("/p/test_app.py"));
        components.insert(
            "api".to_string(),
            ComponentResult::ok("api", Map::new(), observed, Vec::new()),
        );
        components.insert(
            "database".to_string(),
            ComponentResult::fatal("database", "boom".to_string()),
        );

        assert!((test_file_ratio(&components) - 0.5).abs() < 1e-9);
    }
}
