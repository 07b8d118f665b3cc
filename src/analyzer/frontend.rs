//! Frontend-layer analyzer.
//!
//! Classifies UI component files by framework idiom: state and effect
//! hooks, prop typing, styling approach, and the API calls components make.
//! React-family heuristics; other frameworks fall out as plain components.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use super::{Analyzer, ComponentResult, PriorResults};
use crate::fswalk::ProjectView;

static COMPONENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:export\s+(?:default\s+)?)?(?:function|const)\s+([A-Z]\w+)\s*(?:=\s*)?(?:\([^)]*\)|\w+)\s*(?:=>|\{)",
    )
    .expect("valid regex")
});

static CLASS_COMPONENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"class\s+([A-Z]\w+)\s+extends\s+(?:React\.)?(?:Pure)?Component").expect("valid regex")
});

static API_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:fetch|axios\.(?:get|post|put|patch|delete))\(\s*[`"']([^`"']+)[`"']"#)
        .expect("valid regex")
});

static STATE_HOOKS: &[&str] = &["useState(", "useReducer(", "useStore(", "createSignal("];
static EFFECT_HOOKS: &[&str] = &["useEffect(", "useLayoutEffect(", "useMemo(", "useCallback("];

#[derive(Debug)]
struct Component {
    name: String,
    file: String,
    has_state: bool,
    has_effects: bool,
    typed_props: bool,
}

impl Component {
    fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "file": self.file,
            "has_state": self.has_state,
            "has_effects": self.has_effects,
            "typed_props": self.typed_props,
        })
    }
}

/// Analyzer for the frontend layer. Independent; ignores prior results.
pub struct FrontendAnalyzer;

impl FrontendAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Extract components and API calls from one UI source file.
    fn scan_file(
        &self,
        source: &str,
        file: &str,
        components: &mut Vec<Component>,
        api_calls: &mut Vec<String>,
    ) -> StylingVote {
        // File-level signals; attributed to every component in the file.
        // Line-accurate scoping would need an AST and buys little here.
        let has_state = STATE_HOOKS.iter().any(|h| source.contains(h));
        let has_effects = EFFECT_HOOKS.iter().any(|h| source.contains(h));
        let typed_props = source.contains("interface ")
            && source.contains("Props")
            || source.contains("PropTypes.");

        let looks_like_jsx = source.contains("return (") && source.contains('<')
            || source.contains("=> <")
            || source.contains("</");

        let mut seen = BTreeSet::new();
        for caps in COMPONENT_RE.captures_iter(source) {
            if looks_like_jsx && seen.insert(caps[1].to_string()) {
                components.push(Component {
                    name: caps[1].to_string(),
                    file: file.to_string(),
                    has_state,
                    has_effects,
                    typed_props,
                });
            }
        }
        for caps in CLASS_COMPONENT_RE.captures_iter(source) {
            if seen.insert(caps[1].to_string()) {
                components.push(Component {
                    name: caps[1].to_string(),
                    file: file.to_string(),
                    has_state: has_state || source.contains("this.setState"),
                    has_effects,
                    typed_props,
                });
            }
        }

        for caps in API_CALL_RE.captures_iter(source) {
            api_calls.push(caps[1].to_string());
        }

        StylingVote {
            css_modules: source.contains(".module.css") || source.contains(".css\"")
                || source.contains(".css'"),
            styled_components: source.contains("styled."),
            utility_classes: source.contains("className=\"") && source.contains("flex"),
        }
    }
}

/// Per-file styling evidence, summed across the project.
#[derive(Debug, Default)]
struct StylingVote {
    css_modules: bool,
    styled_components: bool,
    utility_classes: bool,
}

impl Default for FrontendAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for FrontendAnalyzer {
    fn name(&self) -> &'static str {
        "frontend"
    }

    fn analyze(
        &self,
        view: &ProjectView,
        _prior: &PriorResults,
    ) -> anyhow::Result<ComponentResult> {
        let mut components = Vec::new();
        let mut api_calls = Vec::new();
        let mut files_observed: BTreeSet<PathBuf> = BTreeSet::new();
        let mut skipped = Vec::new();
        let mut votes = (0usize, 0usize, 0usize);

        for ext in ["jsx", "tsx", "js", "ts"] {
            for path in view.files_with_extension(ext) {
                let rel = view.relative(path);
                match fs::read_to_string(path) {
                    Ok(source) => {
                        let vote = self.scan_file(&source, &rel, &mut components, &mut api_calls);
                        votes.0 += vote.css_modules as usize;
                        votes.1 += vote.styled_components as usize;
                        votes.2 += vote.utility_classes as usize;
                        files_observed.insert(path.to_path_buf());
                    }
                    Err(e) => skipped.push(format!("{}: {}", rel, e)),
                }
            }
        }

        components.sort_by(|a, b| (&a.file, &a.name).cmp(&(&b.file, &b.name)));
        api_calls.sort();
        api_calls.dedup();

        let total = components.len();
        let stateful = components.iter().filter(|c| c.has_state).count();
        let typed = components.iter().filter(|c| c.typed_props).count();
        let ratio = |n: usize| if total == 0 { 0.0 } else { n as f64 / total as f64 };

        let styling = match votes {
            (c, s, u) if s >= c && s >= u && s > 0 => "styled-components",
            (c, _, u) if c >= u && c > 0 => "css",
            (_, _, u) if u > 0 => "utility-classes",
            _ => "none",
        };

        let mut payload = Map::new();
        payload.insert("component_count".to_string(), json!(total));
        payload.insert(
            "components".to_string(),
            Value::Array(components.iter().map(Component::to_json).collect()),
        );
        payload.insert("stateful_count".to_string(), json!(stateful));
        payload.insert("stateful_ratio".to_string(), json!(ratio(stateful)));
        payload.insert("typed_prop_ratio".to_string(), json!(ratio(typed)));
        payload.insert(
            "api_calls".to_string(),
            Value::Array(api_calls.iter().map(|c| json!(c)).collect()),
        );
        payload.insert("styling".to_string(), json!(styling));

        Ok(ComponentResult::ok(
            self.name(),
            payload,
            files_observed,
            skipped,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscoveryConfig;
    use crate::fswalk;
    use std::fs;
    use tempfile::TempDir;

    fn analyze_dir(temp: &TempDir) -> ComponentResult {
        let view = fswalk::collect_project(temp.path(), &DiscoveryConfig::default()).unwrap();
        FrontendAnalyzer::new()
            .analyze(&view, &PriorResults::new())
            .unwrap()
    }

    #[test]
    fn test_function_component_with_hooks() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("UserList.jsx"),
            r#"
import React, { useState, useEffect } from 'react';

export default function UserList() {
    const [users, setUsers] = useState([]);
    useEffect(() => {
        fetch('/api/users').then(r => r.json()).then(setUsers);
    }, []);
    return (
        <ul>{users.map(u => <li key={u.id}>{u.name}</li>)}</ul>
    );
}
"#,
        )
        .unwrap();

        let result = analyze_dir(&temp);
        assert_eq!(result.payload_f64("component_count"), Some(1.0));
        assert_eq!(result.payload_f64("stateful_count"), Some(1.0));

        let calls = result.payload_array("api_calls");
        assert_eq!(calls[0], "/api/users");

        let components = result.payload_array("components");
        assert_eq!(components[0]["name"], "UserList");
        assert_eq!(components[0]["has_effects"], true);
    }

    #[test]
    fn test_typed_props_detection() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("Badge.tsx"),
            r#"
interface BadgeProps {
    label: string;
}

export const Badge = (props: BadgeProps) => {
    return <span>{props.label}</span>;
};
"#,
        )
        .unwrap();

        let result = analyze_dir(&temp);
        assert_eq!(result.payload_f64("component_count"), Some(1.0));
        assert_eq!(result.payload_f64("typed_prop_ratio"), Some(1.0));
    }

    #[test]
    fn test_class_component() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("Legacy.jsx"),
            r#"
class LegacyPanel extends React.Component {
    render() {
        return <div>legacy</div>;
    }
}
"#,
        )
        .unwrap();

        let result = analyze_dir(&temp);
        let components = result.payload_array("components");
        assert_eq!(components[0]["name"], "LegacyPanel");
    }

    #[test]
    fn test_non_component_js_ignored() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("math.js"),
            "function add(a, b) { return a + b; }\nmodule.exports = { add };\n",
        )
        .unwrap();

        let result = analyze_dir(&temp);
        assert_eq!(result.payload_f64("component_count"), Some(0.0));
    }
}
