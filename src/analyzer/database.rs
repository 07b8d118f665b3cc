//! Data-layer analyzer.
//!
//! Static-parses SQL DDL and Python ORM declarations for entities,
//! relationships, and structural conventions (tenant columns, UUID primary
//! keys, soft-delete columns, row-level-security policies). Line-level
//! heuristics only; no live schema connection is attempted.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use super::{Analyzer, ComponentResult, PriorResults};
use crate::fswalk::ProjectView;

static CREATE_TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?["`]?(\w+)["`]?"#)
        .expect("valid regex")
});

static COLUMN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*["`]?(\w+)["`]?\s+(\w+)"#).expect("valid regex"));

static REFERENCES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)REFERENCES\s+["`]?(\w+)["`]?"#).expect("valid regex"));

static RLS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(CREATE\s+POLICY|ENABLE\s+ROW\s+LEVEL\s+SECURITY)").expect("valid regex")
});

static ORM_CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^class\s+(\w+)\s*\(\s*(?:\w+\.)?(Base|Model|models\.Model|DeclarativeBase)\s*\)")
        .expect("valid regex")
});

static ORM_COLUMN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s+(\w+)\s*(?::\s*[\w\[\]\. ]+)?=\s*(?:\w+\.)?(Column|mapped_column|models\.\w+Field|ForeignKey)")
        .expect("valid regex")
});

static ORM_FK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"ForeignKey\(\s*["']([\w.]+)["']"#).expect("valid regex")
});

/// Column names treated as tenant discriminators.
const TENANT_COLUMNS: &[&str] = &["tenant_id", "org_id", "organization_id", "account_id"];

/// Column names treated as soft-delete markers.
const SOFT_DELETE_COLUMNS: &[&str] = &["deleted_at", "is_deleted", "deleted"];

/// One extracted entity (SQL table or ORM model).
#[derive(Debug, Default)]
struct Entity {
    name: String,
    file: String,
    columns: Vec<String>,
    has_tenant_column: bool,
    has_uuid_pk: bool,
    has_soft_delete: bool,
    references: Vec<String>,
}

impl Entity {
    fn note_column(&mut self, name: &str, type_hint: &str) {
        let lower = name.to_lowercase();
        if TENANT_COLUMNS.contains(&lower.as_str()) {
            self.has_tenant_column = true;
        }
        if SOFT_DELETE_COLUMNS.contains(&lower.as_str()) {
            self.has_soft_delete = true;
        }
        if lower == "id" && type_hint.to_lowercase().contains("uuid") {
            self.has_uuid_pk = true;
        }
        self.columns.push(lower);
    }

    fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "file": self.file,
            "column_count": self.columns.len(),
            "has_tenant_column": self.has_tenant_column,
            "uuid_primary_key": self.has_uuid_pk,
            "soft_delete": self.has_soft_delete,
        })
    }
}

/// Analyzer for the data layer. Independent; ignores prior results.
pub struct DatabaseAnalyzer;

impl DatabaseAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn parse_sql(&self, source: &str, file: &str, entities: &mut Vec<Entity>) -> usize {
        let mut rls_hits = 0;
        let mut current: Option<Entity> = None;

        for line in source.lines() {
            if RLS_RE.is_match(line) {
                rls_hits += 1;
            }

            if let Some(caps) = CREATE_TABLE_RE.captures(line) {
                if let Some(done) = current.take() {
                    entities.push(done);
                }
                current = Some(Entity {
                    name: caps[1].to_lowercase(),
                    file: file.to_string(),
                    ..Default::default()
                });
                continue;
            }

            if let Some(entity) = current.as_mut() {
                if let Some(caps) = REFERENCES_RE.captures(line) {
                    entity.references.push(caps[1].to_lowercase());
                }
                // UUID PK spelled on the id line or as a table constraint.
                if let Some(caps) = COLUMN_RE.captures(line) {
                    let col = caps[1].to_string();
                    let ty = caps[2].to_string();
                    if !col.eq_ignore_ascii_case("primary")
                        && !col.eq_ignore_ascii_case("foreign")
                        && !col.eq_ignore_ascii_case("constraint")
                        && !col.eq_ignore_ascii_case("unique")
                    {
                        entity.note_column(&col, &ty);
                    }
                }
                if line.contains(");") {
                    entities.push(current.take().expect("current entity present"));
                }
            }
        }
        if let Some(done) = current.take() {
            entities.push(done);
        }
        rls_hits
    }

    fn parse_orm(&self, source: &str, file: &str, entities: &mut Vec<Entity>) {
        let mut current: Option<Entity> = None;

        for line in source.lines() {
            if let Some(caps) = ORM_CLASS_RE.captures(line) {
                if let Some(done) = current.take() {
                    entities.push(done);
                }
                current = Some(Entity {
                    name: caps[1].to_lowercase(),
                    file: file.to_string(),
                    ..Default::default()
                });
                continue;
            }

            // A dedented non-empty line ends the class body.
            if current.is_some()
                && !line.trim().is_empty()
                && !line.starts_with(' ')
                && !line.starts_with('\t')
            {
                entities.push(current.take().expect("current entity present"));
            }

            if let Some(entity) = current.as_mut() {
                if let Some(caps) = ORM_COLUMN_RE.captures(line) {
                    entity.note_column(&caps[1], line);
                    if line.contains("UUID") && caps[1].eq_ignore_ascii_case("id") {
                        entity.has_uuid_pk = true;
                    }
                }
                if let Some(caps) = ORM_FK_RE.captures(line) {
                    let target = caps[1].split('.').next().unwrap_or(&caps[1]);
                    entity.references.push(target.to_lowercase());
                }
            }
        }
        if let Some(done) = current.take() {
            entities.push(done);
        }
    }
}

impl Default for DatabaseAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for DatabaseAnalyzer {
    fn name(&self) -> &'static str {
        "database"
    }

    fn analyze(
        &self,
        view: &ProjectView,
        _prior: &PriorResults,
    ) -> anyhow::Result<ComponentResult> {
        let mut entities = Vec::new();
        let mut rls_policy_count = 0usize;
        let mut files_observed: BTreeSet<PathBuf> = BTreeSet::new();
        let mut skipped = Vec::new();

        for path in view.files_with_extension("sql") {
            let rel = view.relative(path);
            match fs::read_to_string(path) {
                Ok(source) => {
                    rls_policy_count += self.parse_sql(&source, &rel, &mut entities);
                    files_observed.insert(path.to_path_buf());
                }
                Err(e) => skipped.push(format!("{}: {}", rel, e)),
            }
        }

        for path in view.files_with_extension("py") {
            let rel = view.relative(path);
            match fs::read_to_string(path) {
                Ok(source) => {
                    self.parse_orm(&source, &rel, &mut entities);
                    files_observed.insert(path.to_path_buf());
                }
                Err(e) => skipped.push(format!("{}: {}", rel, e)),
            }
        }

        entities.sort_by(|a, b| a.name.cmp(&b.name));

        let model_count = entities.len();
        let relationships: Vec<Value> = entities
            .iter()
            .flat_map(|e| {
                e.references
                    .iter()
                    .map(move |r| json!({ "from": e.name, "to": r }))
            })
            .collect();

        let ratio = |pred: fn(&Entity) -> bool| -> f64 {
            if model_count == 0 {
                0.0
            } else {
                entities.iter().filter(|e| pred(e)).count() as f64 / model_count as f64
            }
        };

        let mut payload = Map::new();
        payload.insert("model_count".to_string(), json!(model_count));
        payload.insert(
            "entities".to_string(),
            Value::Array(entities.iter().map(Entity::to_json).collect()),
        );
        payload.insert("relationship_count".to_string(), json!(relationships.len()));
        payload.insert("relationships".to_string(), Value::Array(relationships));
        payload.insert(
            "tenant_column_ratio".to_string(),
            json!(ratio(|e| e.has_tenant_column)),
        );
        payload.insert(
            "uuid_pk_ratio".to_string(),
            json!(ratio(|e| e.has_uuid_pk)),
        );
        payload.insert(
            "soft_delete_ratio".to_string(),
            json!(ratio(|e| e.has_soft_delete)),
        );
        payload.insert("rls_policy_count".to_string(), json!(rls_policy_count));

        Ok(ComponentResult::ok(
            self.name(),
            payload,
            files_observed,
            skipped,
        ))
    }
}
