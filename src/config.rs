//! Configuration schema for the discovery engine.
//!
//! A config defines runtime limits, cache behavior, and the tunable
//! thresholds of the pattern recognizer and quality scorer. All fields have
//! defaults so a bare `archscout discover <path>` works without any file.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::error::DiscoveryError;

/// Default per-analyzer wall-clock budget in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default cache entry time-to-live in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3_600;

/// Default maximum file size opened by any analyzer.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10_485_760;

/// Default minimum confidence for a pattern match to be reported.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Default worker-thread count for the independent-analyzer phase.
pub const DEFAULT_PARALLEL_WORKERS: usize = 4;

/// Extensions scanned when the config doesn't override them.
pub const DEFAULT_EXTENSIONS: &[&str] = &["py", "js", "ts", "tsx", "jsx", "sql"];

/// Tolerance used when checking that quality weights sum to 1.0.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Top-level configuration for a discovery run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Wall-clock budget per analyzer invocation, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub per_analyzer_timeout_ms: u64,
    /// Optional budget for the whole `discover()` call, in milliseconds.
    /// Defaults to 4x the per-analyzer budget (three parallel + one
    /// dependent invocation, sum-bounded).
    #[serde(default)]
    pub global_timeout_ms: Option<u64>,
    /// Worker threads dedicated to the independent-analyzer phase.
    #[serde(default = "default_parallel_workers")]
    pub parallel_workers: usize,
    /// Whether prior analyzer results may be reused across runs.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    /// Cache entry time-to-live in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    /// Files larger than this are never opened.
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    /// File extensions (without dot) analyzers are allowed to open.
    #[serde(default = "default_extensions")]
    pub allowed_extensions: BTreeSet<String>,
    /// Glob patterns for paths excluded from the walk, relative to the
    /// project root (e.g. `"migrations/**"`).
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Minimum confidence for a pattern match to be reported.
    #[serde(default = "default_confidence_threshold")]
    pub pattern_confidence_threshold: f64,
    /// Quality sub-score weights. Must sum to 1.0.
    #[serde(default = "default_quality_weights")]
    pub quality_weights: BTreeMap<String, f64>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            per_analyzer_timeout_ms: default_timeout_ms(),
            global_timeout_ms: None,
            parallel_workers: default_parallel_workers(),
            cache_enabled: true,
            cache_ttl_seconds: default_cache_ttl(),
            max_file_size_bytes: default_max_file_size(),
            allowed_extensions: default_extensions(),
            exclude_globs: Vec::new(),
            pattern_confidence_threshold: default_confidence_threshold(),
            quality_weights: default_quality_weights(),
        }
    }
}

impl DiscoveryConfig {
    /// Parse a config from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: DiscoveryConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Effective global budget: explicit value, or 4x the per-analyzer one.
    pub fn effective_global_timeout_ms(&self) -> u64 {
        self.global_timeout_ms
            .unwrap_or(self.per_analyzer_timeout_ms.saturating_mul(4))
    }

    /// Whether a file extension (without dot) may be opened.
    pub fn is_extension_allowed(&self, ext: &str) -> bool {
        self.allowed_extensions.contains(ext)
    }
}

/// Validate configuration invariants.
///
/// Quality weights must sum to 1.0 within floating-point tolerance, every
/// weight must be in [0,1], and the confidence threshold must be in [0,1].
pub fn validate(config: &DiscoveryConfig) -> Result<(), DiscoveryError> {
    if config.per_analyzer_timeout_ms == 0 {
        return Err(DiscoveryError::Config(
            "per_analyzer_timeout_ms must be positive".to_string(),
        ));
    }

    if config.parallel_workers == 0 {
        return Err(DiscoveryError::Config(
            "parallel_workers must be positive".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&config.pattern_confidence_threshold) {
        return Err(DiscoveryError::Config(format!(
            "pattern_confidence_threshold {} out of [0,1]",
            config.pattern_confidence_threshold
        )));
    }

    if config.quality_weights.is_empty() {
        return Err(DiscoveryError::Config(
            "quality_weights must not be empty".to_string(),
        ));
    }

    let mut sum = 0.0;
    for (name, w) in &config.quality_weights {
        if !(0.0..=1.0).contains(w) {
            return Err(DiscoveryError::Config(format!(
                "quality weight {:?} = {} out of [0,1]",
                name, w
            )));
        }
        sum += w;
    }
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(DiscoveryError::Config(format!(
            "quality weights sum to {}, expected 1.0",
            sum
        )));
    }

    for pattern in &config.exclude_globs {
        if let Err(e) = globset::Glob::new(pattern) {
            return Err(DiscoveryError::Config(format!(
                "exclude glob {:?}: {}",
                pattern, e
            )));
        }
    }

    for ext in &config.allowed_extensions {
        if ext.starts_with('.') || ext.is_empty() {
            return Err(DiscoveryError::Config(format!(
                "allowed extension {:?} must be non-empty and without leading dot",
                ext
            )));
        }
    }

    Ok(())
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_extensions() -> BTreeSet<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_parallel_workers() -> usize {
    DEFAULT_PARALLEL_WORKERS
}

/// The documented default weights for the six quality factors.
pub fn default_quality_weights() -> BTreeMap<String, f64> {
    let mut weights = BTreeMap::new();
    weights.insert("maintainability".to_string(), 0.25);
    weights.insert("scalability".to_string(), 0.20);
    weights.insert("security".to_string(), 0.20);
    weights.insert("performance".to_string(), 0.15);
    weights.insert("testability".to_string(), 0.10);
    weights.insert("documentation".to_string(), 0.10);
    weights
}
