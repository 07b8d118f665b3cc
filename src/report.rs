//! Output formatting for discovery results.
//!
//! Supports two output formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption

use colored::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analyzer::{AnalyzerStatus, ComponentResult};
use crate::orchestrator::{DiscoveryResult, IntegrationInsight};
use crate::patterns::PatternMatch;

// =============================================================================
// JSON Format
// =============================================================================

/// Top-level JSON report structure.
#[derive(Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    pub path: String,
    pub overall_score: f64,
    pub sub_scores: std::collections::BTreeMap<String, f64>,
    pub components: std::collections::BTreeMap<String, ComponentResult>,
    pub patterns: Vec<PatternMatch>,
    pub insights: Vec<IntegrationInsight>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
    pub errors_by_analyzer: std::collections::BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

/// Write a result in JSON format.
pub fn write_json(path: &str, result: &DiscoveryResult) -> anyhow::Result<()> {
    let report = JsonReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        path: path.to_string(),
        overall_score: result.quality.overall_score,
        sub_scores: result.quality.sub_scores.clone(),
        components: result.components.clone(),
        patterns: result.patterns.clone(),
        insights: result.insights.clone(),
        recommendations: result.quality.recommendations.clone(),
        errors_by_analyzer: result.metrics.errors_by_analyzer.clone(),
        fatal: result.fatal.clone(),
    };

    let json = serde_json::to_string_pretty(&report)?;
    println!("{}", json);
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write a result in pretty (human-readable) format.
pub fn write_pretty(path: &str, result: &DiscoveryResult) {
    // Header
    println!();
    print!("  ");
    print!("{}", "archscout".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    print!("  {}", "Project:  ".dimmed());
    println!("{}", path);
    println!();

    if let Some(reason) = &result.fatal {
        println!("  {} {}", "✗ FATAL".red().bold(), reason);
        println!();
        return;
    }

    write_component_summary(result);
    println!();

    if !result.patterns.is_empty() {
        write_patterns(&result.patterns);
        println!();
    }

    if !result.insights.is_empty() {
        write_insights(&result.insights);
        println!();
    }

    write_quality(result);
    println!();

    if !result.quality.recommendations.is_empty() {
        println!("  {}", "Recommendations:".bold());
        for rec in &result.quality.recommendations {
            println!("    • {}", rec);
        }
        println!();
    }
}

fn write_component_summary(result: &DiscoveryResult) {
    println!("  {}", "Components:".bold());

    for (name, component) in &result.components {
        write_status_tag(component);
        print!("{:<12}", name);
        print!("{}", summarize_component(name, component).dimmed());
        print!("  {}", format!("{}ms", component.duration_ms).dimmed());
        println!();

        if let Some(error) = &component.error {
            println!("            {}", error.red());
        }
    }
}

fn write_status_tag(component: &ComponentResult) {
    match component.status {
        AnalyzerStatus::Ok => print!("    {} ", "OK   ".green()),
        AnalyzerStatus::Partial => print!("    {} ", "PART ".yellow()),
        AnalyzerStatus::Fatal => print!("    {} ", "FATAL".red()),
    }
}

/// One-line gist of each analyzer's payload.
fn summarize_component(name: &str, component: &ComponentResult) -> String {
    let count = |key: &str| {
        component
            .payload
            .get(key)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };

    match name {
        "database" => format!(
            "{} models, {} relationships",
            count("model_count"),
            count("relationship_count")
        ),
        "api" => format!(
            "{} endpoints, {} authenticated",
            count("endpoint_count"),
            count("authenticated_count")
        ),
        "frontend" => format!("{} components", count("component_count")),
        "security" => {
            let score = component
                .payload
                .get("security_score")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            format!(
                "score {:.2}, {} findings",
                score,
                component.payload_array("findings").len()
            )
        }
        _ => String::new(),
    }
}

fn write_patterns(patterns: &[PatternMatch]) {
    println!("  {} ({}):", "Patterns".bold(), patterns.len());
    println!();

    for p in patterns {
        print!("    ");
        write_colored_confidence(p.confidence);
        print!("  {:<28}", p.name);
        if !p.evidence.is_empty() {
            print!("{}", p.evidence.join(", ").dimmed());
        }
        println!();
    }
}

fn write_colored_confidence(c: f64) {
    let text = format!("{:>4.0}%", c * 100.0);
    match c {
        c if c >= 0.8 => print!("{}", text.green().bold()),
        c if c >= 0.6 => print!("{}", text.green()),
        _ => print!("{}", text.yellow()),
    }
}

fn write_insights(insights: &[IntegrationInsight]) {
    println!("  {}", "Integration:".bold());

    for insight in insights {
        if insight.consistent {
            print!("    {} ", "✓".green());
        } else {
            print!("    {} ", "✗".yellow());
        }
        println!("{}", insight.message);
    }
}

fn write_quality(result: &DiscoveryResult) {
    println!("  {}", "Quality:".bold());

    for (metric, score) in &result.quality.sub_scores {
        print!("    {:<16}", metric);
        write_colored_score(*score);
        println!();
    }

    print!("  {}", "Overall:".bold());
    print!("  ");
    write_colored_score(result.quality.overall_score);
    println!();
}

fn write_colored_score(s: f64) {
    let text = format!("{:.2}", s);
    match s {
        s if s >= 0.75 => print!("{}", text.green().bold()),
        s if s >= 0.6 => print!("{}", text.green()),
        s if s >= 0.4 => print!("{}", text.yellow()),
        _ => print!("{}", text.red()),
    }
}
