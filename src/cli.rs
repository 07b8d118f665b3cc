//! Command-line interface for archscout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DiscoveryConfig;
use crate::orchestrator::DiscoveryEngine;
use crate::report;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Default config file names to search for.
const DEFAULT_CONFIG_NAMES: &[&str] = &["archscout.yaml", ".archscout.yaml"];

/// Starter configuration written by `archscout init`.
const DEFAULT_CONFIG_TEMPLATE: &str = "\
# archscout configuration
per_analyzer_timeout_ms: 30000
parallel_workers: 4
cache_enabled: true
cache_ttl_seconds: 3600
pattern_confidence_threshold: 0.5
";

/// Architecture discovery engine - recover a project's design from its code.
///
/// Archscout scans a project tree with coordinated static analyzers
/// (database schema, API surface, frontend components, security posture),
/// recognizes architectural patterns against a built-in knowledge base,
/// and scores the architecture across six quality dimensions.
#[derive(Parser)]
#[command(name = "archscout")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a project tree and report its architecture
    #[command(visible_alias = "scan")]
    Discover(DiscoverArgs),
    /// Write a starter configuration file
    Init(InitArgs),
}

/// Arguments for the discover command.
#[derive(Parser)]
pub struct DiscoverArgs {
    /// Project directory to analyze
    pub path: PathBuf,

    /// Path to config YAML file (default: auto-discover, fall back to defaults)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Minimum acceptable overall quality score (exit non-zero if below)
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Bypass the analyzer result cache for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Override the per-analyzer timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "archscout.yaml")]
    pub output: PathBuf,
}

/// Find a config file in the current directory, if any.
fn discover_config_file() -> Option<PathBuf> {
    DEFAULT_CONFIG_NAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Run the discover command.
pub fn run_discover(args: &DiscoverArgs) -> anyhow::Result<i32> {
    if args.format != "pretty" && args.format != "json" {
        eprintln!(
            "Error: invalid format {:?}, must be 'pretty' or 'json'",
            args.format
        );
        return Ok(EXIT_ERROR);
    }

    if let Some(threshold) = args.threshold {
        if !(0.0..=1.0).contains(&threshold) {
            eprintln!("Error: threshold must be between 0.0 and 1.0");
            return Ok(EXIT_ERROR);
        }
    }

    // Load config: explicit flag, then auto-discovery, then defaults.
    let config_path = args.config.clone().or_else(discover_config_file);
    let mut config = match &config_path {
        Some(p) => match DiscoveryConfig::parse_file(p) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error parsing config {:?}: {}", p, e);
                return Ok(EXIT_ERROR);
            }
        },
        None => DiscoveryConfig::default(),
    };

    if args.no_cache {
        config.cache_enabled = false;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.per_analyzer_timeout_ms = timeout_ms;
    }

    let engine = match DiscoveryEngine::new(config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let result = engine.discover(&args.path);

    let path_str = args.path.to_string_lossy().to_string();
    match args.format.as_str() {
        "json" => report::write_json(&path_str, &result)?,
        _ => report::write_pretty(&path_str, &result),
    }

    if result.is_fatal() {
        return Ok(EXIT_FAILED);
    }
    if let Some(threshold) = args.threshold {
        if result.quality.overall_score < threshold {
            return Ok(EXIT_FAILED);
        }
    }
    Ok(EXIT_SUCCESS)
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    if args.output.exists() {
        eprintln!("Error: {:?} already exists", args.output);
        return Ok(EXIT_ERROR);
    }

    std::fs::write(&args.output, DEFAULT_CONFIG_TEMPLATE)?;
    println!("Created {:?}", args.output);
    Ok(EXIT_SUCCESS)
}
