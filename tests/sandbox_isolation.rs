//! Integration tests for failure isolation.
//!
//! These tests drive hostile analyzers (hangs, panics, errors) through the
//! sandbox and cache layers and assert the engine-level degradation
//! behavior: one bad analyzer never poisons the run, and its slice of the
//! quality score falls back to neutral.

use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde_json::{json, Map};
use tempfile::TempDir;

use archscout::analyzer::{Analyzer, AnalyzerStatus, ComponentResult, PriorResults};
use archscout::cache::AnalysisCache;
use archscout::config::{self, DiscoveryConfig};
use archscout::fswalk;
use archscout::quality;
use archscout::sandbox::SandboxRunner;
use archscout::ProjectView;

struct HangingAnalyzer;

impl Analyzer for HangingAnalyzer {
    fn name(&self) -> &'static str {
        "hanging"
    }

    fn analyze(&self, _view: &ProjectView, _prior: &PriorResults) -> anyhow::Result<ComponentResult> {
        std::thread::sleep(Duration::from_secs(30));
        Ok(ComponentResult::ok(
            self.name(),
            Map::new(),
            Default::default(),
            Vec::new(),
        ))
    }
}

struct PanickingAnalyzer;

impl Analyzer for PanickingAnalyzer {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn analyze(&self, _view: &ProjectView, _prior: &PriorResults) -> anyhow::Result<ComponentResult> {
        panic!("index out of bounds in fake parser");
    }
}

/// Counts invocations so cache behavior is observable.
struct CountingAnalyzer {
    calls: Arc<AtomicUsize>,
}

impl Analyzer for CountingAnalyzer {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn analyze(&self, view: &ProjectView, _prior: &PriorResults) -> anyhow::Result<ComponentResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut payload = Map::new();
        payload.insert("files".to_string(), json!(view.files().len()));
        let observed = view.files().iter().cloned().collect();
        Ok(ComponentResult::ok(self.name(), payload, observed, Vec::new()))
    }
}

fn project_with_file(content: &str) -> (TempDir, ProjectView) {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("app.py"), content).unwrap();
    let view = fswalk::collect_project(temp.path(), &DiscoveryConfig::default()).unwrap();
    (temp, view)
}

#[test]
fn test_hanging_analyzer_is_cut_off() {
    let (_temp, view) = project_with_file("x = 1\n");
    let runner = SandboxRunner::new(Duration::from_millis(100));

    let started = Instant::now();
    let result = runner.run(Box::new(HangingAnalyzer), &view, &PriorResults::new());
    let elapsed = started.elapsed();

    assert_eq!(result.status, AnalyzerStatus::Fatal);
    assert!(result.error.as_deref().unwrap().contains("timeout"));
    // The caller returns promptly even though the worker sleeps for 30s.
    assert!(elapsed < Duration::from_secs(5), "took {:?}", elapsed);
}

#[test]
fn test_hanging_analyzer_does_not_block_siblings() {
    let (_temp, view) = project_with_file("x = 1\n");
    let runner = SandboxRunner::new(Duration::from_millis(200));
    let calls = Arc::new(AtomicUsize::new(0));

    let analyzers: Vec<Box<dyn Analyzer>> = vec![
        Box::new(HangingAnalyzer),
        Box::new(CountingAnalyzer { calls: calls.clone() }),
        Box::new(CountingAnalyzer { calls: calls.clone() }),
    ];

    let started = Instant::now();
    let results: Vec<ComponentResult> = analyzers
        .into_par_iter()
        .map(|analyzer| runner.run(analyzer, &view, &PriorResults::new()))
        .collect();
    let elapsed = started.elapsed();

    // Exactly one timeout; both siblings ran to completion alongside it.
    let fatal: Vec<_> = results
        .iter()
        .filter(|r| r.status == AnalyzerStatus::Fatal)
        .collect();
    assert_eq!(fatal.len(), 1);
    assert!(fatal[0].error.as_deref().unwrap().contains("timeout"));
    assert_eq!(
        results.iter().filter(|r| r.status == AnalyzerStatus::Ok).count(),
        2
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(elapsed < Duration::from_secs(5), "took {:?}", elapsed);
}

#[test]
fn test_panic_is_contained() {
    let (_temp, view) = project_with_file("x = 1\n");
    let runner = SandboxRunner::new(Duration::from_secs(5));

    let result = runner.run(Box::new(PanickingAnalyzer), &view, &PriorResults::new());

    assert_eq!(result.status, AnalyzerStatus::Fatal);
    let error = result.error.as_deref().unwrap();
    assert!(error.contains("panic"), "error was {:?}", error);
    assert!(error.contains("index out of bounds"));

    // The same runner keeps working afterwards.
    let calls = Arc::new(AtomicUsize::new(0));
    let ok = runner.run(
        Box::new(CountingAnalyzer { calls: calls.clone() }),
        &view,
        &PriorResults::new(),
    );
    assert_eq!(ok.status, AnalyzerStatus::Ok);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_fatal_component_degrades_to_neutral_slice() {
    // Build a components map where security failed outright.
    let mut components: BTreeMap<String, ComponentResult> = BTreeMap::new();
    components.insert(
        "security".to_string(),
        ComponentResult::fatal("security", "timeout after 100ms".to_string()),
    );

    let metrics = quality::score(&components, &[], &config::default_quality_weights());

    assert_eq!(metrics.sub_scores.get("security"), Some(&0.5));
    // All slices neutral means the overall collapses to exactly 0.5.
    assert!((metrics.overall_score - 0.5).abs() < 1e-9);
}

#[test]
fn test_cache_serves_hit_then_invalidates_on_edit() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("app.py"), "x = 1\n").unwrap();
    let view = fswalk::collect_project(temp.path(), &DiscoveryConfig::default()).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let cache = AnalysisCache::new(3600);
    let runner = SandboxRunner::new(Duration::from_secs(5));

    let run = |view: &ProjectView| {
        if let Some(hit) = cache.get(view.root(), "counting", 0) {
            return hit;
        }
        let result = runner.run(
            Box::new(CountingAnalyzer { calls: calls.clone() }),
            view,
            &PriorResults::new(),
        );
        cache.put(view.root(), "counting", 0, &result).unwrap();
        result
    };

    run(&view);
    run(&view);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "second run should hit the cache");

    // Editing an observed file changes its content hash.
    fs::write(temp.path().join("app.py"), "x = 2\n").unwrap();
    run(&view);
    assert_eq!(calls.load(Ordering::SeqCst), 2, "edit should force reanalysis");
}
