//! Error taxonomy for the discovery engine.
//!
//! Only `Validation` aborts a `discover()` call before any analyzer runs.
//! Every other class is captured at the sandbox or cache boundary, attached
//! to the relevant `ComponentResult`, and the pipeline continues with
//! degraded data.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during a discovery run.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Bad project path. The only error that is fatal to the whole call.
    #[error("invalid project path {path:?}: {reason}")]
    Validation { path: PathBuf, reason: String },

    /// An analyzer exceeded its wall-clock budget. Recorded per-analyzer.
    #[error("analyzer {analyzer:?} exceeded its timeout of {timeout_ms}ms")]
    AnalyzerTimeout { analyzer: String, timeout_ms: u64 },

    /// An analyzer panicked. Caught at the sandbox boundary.
    #[error("analyzer {analyzer:?} panicked: {message}")]
    AnalyzerPanic { analyzer: String, message: String },

    /// Broken configuration (weights that don't sum to 1.0, bad extension
    /// list, unparsable YAML).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Cache read/hash failure. Never fatal to a run; a failed lookup
    /// degrades to a miss and a failed store is skipped.
    #[error("cache error: {0}")]
    Cache(String),
}

impl DiscoveryError {
    /// Whether this error aborts the whole `discover()` call.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            DiscoveryError::Validation { .. } | DiscoveryError::Config(_)
        )
    }
}
