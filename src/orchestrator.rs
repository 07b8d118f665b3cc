//! Discovery orchestration.
//!
//! The engine walks a fixed phase sequence:
//! `Idle -> Scheduling -> ParallelPhase -> DependentPhase -> SynthesisPhase -> Done`.
//! The three independent analyzers run concurrently through cache and
//! sandbox; the security analyzer runs after a full barrier-join on their
//! results; synthesis (insights, patterns, quality) is a pure function over
//! the merged map. An analyzer failure never aborts the run; only an
//! unreadable project path or a synthesis panic produces an overall fatal
//! result.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::analyzer::{
    self, ComponentResult, PriorResults,
};
use crate::cache::{upstream_results_hash, AnalysisCache};
use crate::config::{self, DiscoveryConfig};
use crate::error::DiscoveryError;
use crate::fswalk::{self, ProjectView};
use crate::patterns::{self, PatternMatch};
use crate::quality::{self, QualityMetrics};
use crate::sandbox::SandboxRunner;

/// Immutable description of one discovery run.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub project_path: PathBuf,
    pub per_analyzer_timeout: Duration,
    pub cache_enabled: bool,
    pub global_timeout: Duration,
}

impl AnalysisRequest {
    /// Build a request from a path and the engine configuration.
    pub fn new(project_path: &Path, config: &DiscoveryConfig) -> Self {
        Self {
            project_path: project_path.to_path_buf(),
            per_analyzer_timeout: Duration::from_millis(config.per_analyzer_timeout_ms),
            cache_enabled: config.cache_enabled,
            global_timeout: Duration::from_millis(config.effective_global_timeout_ms()),
        }
    }
}

/// A cross-analyzer derived fact computed during synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationInsight {
    pub kind: String,
    pub message: String,
    pub consistent: bool,
}

/// Timing and error bookkeeping for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisMetrics {
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub phase_durations_ms: BTreeMap<String, u64>,
    pub per_analyzer_ms: BTreeMap<String, u64>,
    pub errors_by_analyzer: BTreeMap<String, String>,
}

/// Terminal, immutable output of one `discover()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub components: BTreeMap<String, ComponentResult>,
    pub insights: Vec<IntegrationInsight>,
    pub patterns: Vec<PatternMatch>,
    pub quality: QualityMetrics,
    pub metrics: AnalysisMetrics,
    /// Set only for run-level failures (bad path, synthesis panic, global
    /// timeout). Analyzer failures live in their component results instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

impl DiscoveryResult {
    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }
}

/// The architecture discovery engine.
///
/// Owns the configuration and the analyzer-result cache; the cache is the
/// only state shared across concurrent invocations and across calls, and
/// all access goes through its internal locking.
pub struct DiscoveryEngine {
    config: DiscoveryConfig,
    cache: AnalysisCache,
    /// Bounded pool for the independent-analyzer phase; sized by
    /// `parallel_workers`, never the machine-wide default.
    pool: rayon::ThreadPool,
}

impl DiscoveryEngine {
    /// Create an engine, validating configuration invariants up front.
    pub fn new(config: DiscoveryConfig) -> Result<Self, DiscoveryError> {
        config::validate(&config)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_workers)
            .thread_name(|i| format!("archscout-worker-{}", i))
            .build()
            .map_err(|e| DiscoveryError::Config(format!("worker pool: {}", e)))?;
        let cache = AnalysisCache::new(config.cache_ttl_seconds);
        Ok(Self { config, cache, pool })
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Run discovery against a project tree.
    pub fn discover(&self, project_path: &Path) -> DiscoveryResult {
        let request = AnalysisRequest::new(project_path, &self.config);
        self.discover_request(&request)
    }

    /// Run discovery with an explicit request.
    pub fn discover_request(&self, request: &AnalysisRequest) -> DiscoveryResult {
        let run_started = Instant::now();
        let deadline = run_started + request.global_timeout;
        let mut metrics = AnalysisMetrics {
            started_at_ms: unix_millis(),
            ..Default::default()
        };

        // Scheduling: validate the path before anything touches the cache.
        let phase_started = Instant::now();
        let view = match self.validate_and_collect(&request.project_path) {
            Ok(view) => view,
            Err(e) => {
                metrics.record_phase("scheduling", phase_started);
                metrics.finished_at_ms = unix_millis();
                return Self::fatal_result(BTreeMap::new(), metrics, e.to_string());
            }
        };
        metrics.record_phase("scheduling", phase_started);

        // ParallelPhase: independent analyzers, no mutual ordering, no
        // cross-cancellation.
        let phase_started = Instant::now();
        let empty_prior = PriorResults::new();
        let parallel: Vec<(String, ComponentResult)> = self.pool.install(|| {
            analyzer::independent_analyzers()
                .par_iter()
                .map(|name| {
                    let result =
                        self.run_analyzer(name, &view, &empty_prior, request, deadline, 0);
                    (name.to_string(), result)
                })
                .collect()
        });

        let mut components: BTreeMap<String, ComponentResult> = parallel.into_iter().collect();
        metrics.record_phase("parallel", phase_started);

        // DependentPhase: security sees the merged upstream results; its
        // cache key folds in their hash so upstream changes invalidate it.
        let phase_started = Instant::now();
        for name in analyzer::dependent_analyzers() {
            let upstream = upstream_results_hash(&components);
            let result = self.run_analyzer(name, &view, &components, request, deadline, upstream);
            components.insert(name.to_string(), result);
        }
        metrics.record_phase("dependent", phase_started);

        for (name, result) in &components {
            metrics
                .per_analyzer_ms
                .insert(name.clone(), result.duration_ms);
            if let Some(error) = &result.error {
                metrics
                    .errors_by_analyzer
                    .insert(name.clone(), error.clone());
            }
        }

        // SynthesisPhase: pure over the merged map. A panic here is the
        // one remaining run-level failure path.
        let phase_started = Instant::now();
        let threshold = self.config.pattern_confidence_threshold;
        let weights = self.config.quality_weights.clone();
        let synthesized = panic::catch_unwind(AssertUnwindSafe(|| {
            let insights = compute_insights(&components);
            let patterns = patterns::recognize(&components, threshold);
            let quality = quality::score(&components, &patterns, &weights);
            (insights, patterns, quality)
        }));
        metrics.record_phase("synthesis", phase_started);
        metrics.finished_at_ms = unix_millis();

        let (insights, patterns, quality) = match synthesized {
            Ok(parts) => parts,
            Err(_) => {
                return Self::fatal_result(
                    components,
                    metrics,
                    "synthesis panicked".to_string(),
                );
            }
        };

        // A run that outlived its global budget still reports whatever it
        // gathered, but as a fatal result.
        let fatal = if Instant::now() > deadline {
            Some(format!(
                "global timeout of {}ms exceeded",
                request.global_timeout.as_millis()
            ))
        } else {
            None
        };

        DiscoveryResult {
            components,
            insights,
            patterns,
            quality,
            metrics,
            fatal,
        }
    }

    /// Validate the project path and build the file view.
    fn validate_and_collect(&self, path: &Path) -> Result<ProjectView, DiscoveryError> {
        let meta = std::fs::metadata(path).map_err(|e| DiscoveryError::Validation {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !meta.is_dir() {
            return Err(DiscoveryError::Validation {
                path: path.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }
        // The walk tolerates per-entry errors, so a root that cannot be
        // opened must be rejected here, not surfaced as an empty file set.
        std::fs::read_dir(path).map_err(|e| DiscoveryError::Validation {
            path: path.to_path_buf(),
            reason: format!("not readable: {}", e),
        })?;
        fswalk::collect_project(path, &self.config).map_err(|e| DiscoveryError::Validation {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Run one analyzer through cache and sandbox, clamped to the
    /// remaining global budget.
    fn run_analyzer(
        &self,
        name: &str,
        view: &ProjectView,
        prior: &PriorResults,
        request: &AnalysisRequest,
        deadline: Instant,
        upstream_hash: u64,
    ) -> ComponentResult {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return ComponentResult::fatal(
                name,
                format!(
                    "global timeout of {}ms exceeded before dispatch",
                    request.global_timeout.as_millis()
                ),
            );
        }

        if request.cache_enabled {
            if let Some(cached) = self.cache.get(view.root(), name, upstream_hash) {
                if std::env::var("ARCHSCOUT_DEBUG").is_ok() {
                    eprintln!("[debug] cache hit for analyzer {}", name);
                }
                return cached;
            }
        }

        let analyzer = match analyzer::create_analyzer(name) {
            Some(a) => a,
            None => {
                return ComponentResult::fatal(name, format!("analyzer {:?} not registered", name))
            }
        };

        let timeout = request.per_analyzer_timeout.min(remaining);
        let runner = SandboxRunner::new(timeout);
        let result = runner.run(analyzer, view, prior);

        if request.cache_enabled && result.is_usable() {
            if let Err(e) = self.cache.put(view.root(), name, upstream_hash, &result) {
                if std::env::var("ARCHSCOUT_DEBUG").is_ok() {
                    eprintln!("[debug] {}", e);
                }
            }
        }

        result
    }

    fn fatal_result(
        components: BTreeMap<String, ComponentResult>,
        metrics: AnalysisMetrics,
        reason: String,
    ) -> DiscoveryResult {
        let quality = quality::score(&components, &[], &config::default_quality_weights());
        DiscoveryResult {
            components,
            insights: Vec::new(),
            patterns: Vec::new(),
            quality,
            metrics,
            fatal: Some(reason),
        }
    }
}

impl AnalysisMetrics {
    fn record_phase(&mut self, phase: &str, started: Instant) {
        self.phase_durations_ms
            .insert(phase.to_string(), started.elapsed().as_millis() as u64);
    }
}

/// Cross-analyzer consistency checks, pure over the component results.
fn compute_insights(components: &BTreeMap<String, ComponentResult>) -> Vec<IntegrationInsight> {
    let mut insights = Vec::new();
    let usable = |name: &str| components.get(name).filter(|r| r.is_usable());

    // Tenant isolation in the schema should be matched by endpoint auth.
    if let (Some(db), Some(api)) = (usable("database"), usable("api")) {
        let tenant_ratio = db.payload_f64("tenant_column_ratio").unwrap_or(0.0);
        if tenant_ratio > 0.0 {
            let auth = api.payload_f64("auth_coverage").unwrap_or(0.0);
            let consistent = auth >= 0.5;
            insights.push(IntegrationInsight {
                kind: "auth_tenant_alignment".to_string(),
                message: format!(
                    "tenant columns on {:.0}% of models, auth on {:.0}% of endpoints",
                    tenant_ratio * 100.0,
                    auth * 100.0
                ),
                consistent,
            });
        }
    }

    // Frontend calls should resolve to declared routes.
    if let Some(ratio) = patterns::route_consistency(components) {
        insights.push(IntegrationInsight {
            kind: "frontend_route_alignment".to_string(),
            message: format!("{:.0}% of frontend API calls match declared routes", ratio * 100.0),
            consistent: ratio >= 0.8,
        });
    }

    // Validation coverage note when endpoints exist at all.
    if let Some(api) = usable("api") {
        let endpoints = api.payload_f64("endpoint_count").unwrap_or(0.0);
        if endpoints > 0.0 {
            let validation = api.payload_f64("validation_coverage").unwrap_or(0.0);
            insights.push(IntegrationInsight {
                kind: "input_validation".to_string(),
                message: format!("{:.0}% of endpoints declare validation", validation * 100.0),
                consistent: validation >= 0.5,
            });
        }
    }

    // Unauthenticated endpoints that security flagged as exposure.
    if let (Some(api), Some(sec)) = (usable("api"), usable("security")) {
        let public = api.payload_f64("endpoint_count").unwrap_or(0.0)
            - api.payload_f64("authenticated_count").unwrap_or(0.0);
        let exposure = sec
            .payload
            .get("attack_surface")
            .and_then(|s| s.get("exposure_score"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        if public > 0.0 {
            insights.push(IntegrationInsight {
                kind: "attack_surface".to_string(),
                message: format!(
                    "{} public endpoints, exposure score {:.2}",
                    public as u64, exposure
                ),
                consistent: exposure < 0.3,
            });
        }
    }

    insights
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    fn engine() -> DiscoveryEngine {
        DiscoveryEngine::new(DiscoveryConfig::default()).unwrap()
    }

    fn small_project() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("schema.sql"),
            "CREATE TABLE users (\n id UUID PRIMARY KEY,\n email TEXT\n);",
        )
        .unwrap();
        fs::write(
            temp.path().join("routes.py"),
            "@app.route(\"/users\", methods=[\"GET\"])\ndef list_users():\n    pass\n",
        )
        .unwrap();
        temp
    }

    #[test]
    fn test_missing_path_is_fatal_and_fast() {
        let engine = engine();
        let started = Instant::now();
        let result = engine.discover(Path::new("/no/such/project"));

        assert!(result.is_fatal());
        assert!(result.components.is_empty());
        assert!(result.patterns.is_empty());
        // Fail fast: validation must not wait on any analyzer budget.
        assert!(started.elapsed() < Duration::from_secs(5));
        // Never touches the cache.
        assert!(engine.cache.is_empty());
    }

    #[test]
    fn test_file_path_is_fatal() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("single.py");
        fs::write(&file, "x = 1").unwrap();

        let result = engine().discover(&file);
        assert!(result.is_fatal());
        assert!(result.fatal.as_deref().unwrap().contains("not a directory"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let project = temp.path().join("locked");
        fs::create_dir(&project).unwrap();
        fs::write(project.join("app.py"), "x = 1").unwrap();
        fs::set_permissions(&project, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users bypass mode bits; only assert where the denial
        // actually takes effect.
        if fs::read_dir(&project).is_err() {
            let result = engine().discover(&project);
            assert!(result.is_fatal());
            assert!(result.fatal.as_deref().unwrap().contains("not readable"));
            assert!(result.components.is_empty());
        }

        fs::set_permissions(&project, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_single_worker_pool_completes_all_phases() {
        let temp = small_project();
        let config = DiscoveryConfig {
            parallel_workers: 1,
            ..Default::default()
        };
        let engine = DiscoveryEngine::new(config).unwrap();

        let result = engine.discover(temp.path());
        assert!(!result.is_fatal());
        assert_eq!(result.components.len(), 4);
    }

    #[test]
    fn test_all_four_analyzers_present() {
        let temp = small_project();
        let result = engine().discover(temp.path());

        assert!(!result.is_fatal());
        for name in ["database", "api", "frontend", "security"] {
            assert!(result.components.contains_key(name), "missing {}", name);
            assert!(result.metrics.per_analyzer_ms.contains_key(name));
        }
        assert_eq!(result.metrics.errors_by_analyzer.len(), 0);
        assert!(result.metrics.phase_durations_ms.contains_key("parallel"));
        assert!(result.metrics.phase_durations_ms.contains_key("synthesis"));
    }

    #[test]
    fn test_quality_invariant_holds() {
        let temp = small_project();
        let result = engine().discover(temp.path());

        let q = &result.quality;
        let expected: f64 = q
            .weights
            .iter()
            .map(|(k, w)| w * q.sub_scores.get(k).copied().unwrap_or(0.5))
            .sum();
        assert!((q.overall_score - expected).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&q.overall_score));
    }

    #[test]
    fn test_cached_rerun_is_idempotent() {
        let temp = small_project();
        let engine = engine();

        let first = engine.discover(temp.path());
        let second = engine.discover(temp.path());

        for name in ["database", "api", "frontend", "security"] {
            assert_eq!(
                serde_json::to_string(&first.components[name].payload).unwrap(),
                serde_json::to_string(&second.components[name].payload).unwrap(),
                "payload for {} changed across cached runs",
                name
            );
        }
        let first_patterns: Vec<_> = first.patterns.iter().map(|p| &p.name).collect();
        let second_patterns: Vec<_> = second.patterns.iter().map(|p| &p.name).collect();
        assert_eq!(first_patterns, second_patterns);
    }

    #[test]
    fn test_mutating_file_invalidates_cache() {
        let temp = small_project();
        let engine = engine();

        engine.discover(temp.path());
        let before = engine.cache.len();
        assert!(before > 0);

        fs::write(
            temp.path().join("schema.sql"),
            "CREATE TABLE users (\n id UUID PRIMARY KEY,\n email TEXT,\n tenant_id UUID\n);",
        )
        .unwrap();

        let result = engine.discover(temp.path());
        let db = &result.components["database"];
        assert_eq!(db.payload_f64("tenant_column_ratio"), Some(1.0));
    }

    #[test]
    fn test_insights_on_inconsistent_auth() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("schema.sql"),
            "CREATE TABLE users (\n id UUID PRIMARY KEY,\n tenant_id UUID\n);",
        )
        .unwrap();
        fs::write(
            temp.path().join("routes.py"),
            "@app.route(\"/users\", methods=[\"GET\"])\ndef list_users():\n    pass\n",
        )
        .unwrap();

        let result = engine().discover(temp.path());
        let insight = result
            .insights
            .iter()
            .find(|i| i.kind == "auth_tenant_alignment")
            .expect("tenant schema with open endpoints should produce insight");
        assert!(!insight.consistent);
    }
}
