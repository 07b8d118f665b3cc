//! API-layer analyzer.
//!
//! Parses route declarations at three levels: application-wide middleware,
//! router grouping, and individual endpoint signatures (path, method, auth
//! and validation markers). Understands Flask/FastAPI decorator style and
//! Express-style registration.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use super::{Analyzer, ComponentResult, PriorResults};
use crate::fswalk::ProjectView;

static PY_ROUTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@(?:\w+)\.(route|get|post|put|patch|delete)\(\s*["']([^"']+)["']"#)
        .expect("valid regex")
});

static PY_METHODS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"methods\s*=\s*\[([^\]]*)\]"#).expect("valid regex"));

static JS_ROUTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:app|router)\.(get|post|put|patch|delete|all)\(\s*["'`]([^"'`]+)["'`]"#)
        .expect("valid regex")
});

static MIDDLEWARE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"app\.use\(\s*([\w.]+)").expect("valid regex"));

/// Decorators/arguments that mark an endpoint as authenticated.
static AUTH_MARKERS: &[&str] = &[
    "@login_required",
    "@requires_auth",
    "@jwt_required",
    "Depends(get_current_user",
    "requireAuth",
    "ensureAuthenticated",
    "passport.authenticate",
    "authMiddleware",
];

/// Markers that indicate request validation on an endpoint.
static VALIDATION_MARKERS: &[&str] = &[
    "@validate",
    "@use_args",
    "BaseModel",
    "validateBody",
    "celebrate(",
    "body(",
    "zodValidator",
];

/// Middleware names counted as auth-aware at the application level.
static AUTH_MIDDLEWARE: &[&str] = &["passport", "auth", "jwt", "session"];

#[derive(Debug)]
struct Endpoint {
    path: String,
    method: String,
    file: String,
    line: usize,
    auth_required: bool,
    validated: bool,
}

impl Endpoint {
    fn to_json(&self) -> Value {
        json!({
            "path": self.path,
            "method": self.method,
            "file": self.file,
            "line": self.line,
            "auth_required": self.auth_required,
            "validated": self.validated,
        })
    }
}

/// Analyzer for the API layer. Independent; ignores prior results.
pub struct ApiAnalyzer;

impl ApiAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Scan one source file for endpoint declarations.
    ///
    /// Decorator-style markers (Python) appear on the lines just above a
    /// route; Express-style markers appear on the route line itself. A
    /// three-line lookbehind and the declaration line cover both.
    fn scan_file(&self, source: &str, file: &str, endpoints: &mut Vec<Endpoint>) -> Vec<String> {
        let lines: Vec<&str> = source.lines().collect();
        let mut middleware = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            if let Some(caps) = MIDDLEWARE_RE.captures(line) {
                middleware.push(caps[1].to_string());
            }

            let (path, method) = if let Some(caps) = PY_ROUTE_RE.captures(line) {
                let verb = &caps[1];
                let method = if verb == "route" {
                    PY_METHODS_RE
                        .captures(line)
                        .and_then(|m| {
                            m[1].split(',')
                                .next()
                                .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\'').to_uppercase())
                        })
                        .unwrap_or_else(|| "GET".to_string())
                } else {
                    verb.to_uppercase()
                };
                (caps[2].to_string(), method)
            } else if let Some(caps) = JS_ROUTE_RE.captures(line) {
                (caps[2].to_string(), caps[1].to_uppercase())
            } else {
                continue;
            };

            // Look at the declaration line, a few lines above (stacked
            // decorators), and the line after (def signature / handler args).
            let window_start = idx.saturating_sub(3);
            let window_end = (idx + 2).min(lines.len());
            let window = lines[window_start..window_end].join("\n");

            let auth_required = AUTH_MARKERS.iter().any(|m| window.contains(m));
            let validated = VALIDATION_MARKERS.iter().any(|m| window.contains(m));

            endpoints.push(Endpoint {
                path,
                method,
                file: file.to_string(),
                line: idx + 1,
                auth_required,
                validated,
            });
        }

        middleware
    }
}

impl Default for ApiAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for ApiAnalyzer {
    fn name(&self) -> &'static str {
        "api"
    }

    fn analyze(
        &self,
        view: &ProjectView,
        _prior: &PriorResults,
    ) -> anyhow::Result<ComponentResult> {
        let mut endpoints = Vec::new();
        let mut middleware = Vec::new();
        let mut files_observed: BTreeSet<PathBuf> = BTreeSet::new();
        let mut skipped = Vec::new();

        for ext in ["py", "js", "ts"] {
            for path in view.files_with_extension(ext) {
                let rel = view.relative(path);
                match fs::read_to_string(path) {
                    Ok(source) => {
                        middleware.extend(self.scan_file(&source, &rel, &mut endpoints));
                        files_observed.insert(path.to_path_buf());
                    }
                    Err(e) => skipped.push(format!("{}: {}", rel, e)),
                }
            }
        }

        endpoints.sort_by(|a, b| (&a.file, a.line).cmp(&(&b.file, b.line)));
        middleware.sort();
        middleware.dedup();

        let total = endpoints.len();
        let authed = endpoints.iter().filter(|e| e.auth_required).count();
        let validated = endpoints.iter().filter(|e| e.validated).count();
        let coverage = |n: usize| if total == 0 { 0.0 } else { n as f64 / total as f64 };

        let has_auth_middleware = middleware.iter().any(|m| {
            let lower = m.to_lowercase();
            AUTH_MIDDLEWARE.iter().any(|a| lower.contains(a))
        });

        let mut payload = Map::new();
        payload.insert("endpoint_count".to_string(), json!(total));
        payload.insert(
            "endpoints".to_string(),
            Value::Array(endpoints.iter().map(Endpoint::to_json).collect()),
        );
        payload.insert("authenticated_count".to_string(), json!(authed));
        payload.insert("auth_coverage".to_string(), json!(coverage(authed)));
        payload.insert(
            "validation_coverage".to_string(),
            json!(coverage(validated)),
        );
        payload.insert(
            "middleware".to_string(),
            Value::Array(middleware.iter().map(|m| json!(m)).collect()),
        );
        payload.insert(
            "has_auth_middleware".to_string(),
            json!(has_auth_middleware),
        );

        Ok(ComponentResult::ok(
            self.name(),
            payload,
            files_observed,
            skipped,
        ))
    }
}
