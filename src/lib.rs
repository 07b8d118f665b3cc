//! Archscout - architecture discovery engine.
//!
//! Archscout recovers a project's architecture from its source tree. A
//! coordinated set of static analyzers examines the database schema, API
//! surface, frontend components, and security posture; their merged
//! findings feed a pattern recognizer backed by a built-in knowledge base
//! and a weighted quality scorer.
//!
//! # Architecture
//!
//! - `analyzer`: The analyzer trait, registry, and the four analyzers
//! - `orchestrator`: Phase-driven engine coordinating analyzers through
//!   cache and sandbox into an immutable [`DiscoveryResult`]
//! - `sandbox`: Timeout and panic isolation for analyzer invocations
//! - `cache`: Content-hash keyed, TTL-bounded analyzer result cache
//! - `patterns`: Knowledge-base driven architectural pattern recognition
//! - `quality`: Six-dimension weighted quality scoring
//! - `fswalk`: Filtered project tree collection
//! - `report`: Output formatting (pretty, JSON)
//!
//! # Adding a New Analyzer
//!
//! Implement the [`Analyzer`] trait and register a constructor in
//! `analyzer/mod.rs`; declare upstream analyzers via `dependencies()` and
//! the orchestrator schedules it after them.

pub mod analyzer;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fswalk;
pub mod orchestrator;
pub mod patterns;
pub mod quality;
pub mod report;
pub mod sandbox;

pub use analyzer::{Analyzer, AnalyzerStatus, ComponentResult, PriorResults};
pub use cache::AnalysisCache;
pub use config::DiscoveryConfig;
pub use error::DiscoveryError;
pub use fswalk::ProjectView;
pub use orchestrator::{
    AnalysisMetrics, AnalysisRequest, DiscoveryEngine, DiscoveryResult, IntegrationInsight,
};
pub use patterns::{FeatureVector, PatternMatch};
pub use quality::QualityMetrics;
pub use sandbox::SandboxRunner;
