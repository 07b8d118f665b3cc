//! Project-tree file collection.
//!
//! Every file an analyzer sees passes through here first: extension
//! allowlist, size cap, and a symlink guard that refuses entries resolving
//! outside the project root. Analyzers are read-only consumers of the
//! returned view and never open paths on their own.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::DiscoveryConfig;

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    "vendor",
    "__pycache__",
    "dist",
    "build",
    "target",
    ".venv",
    "venv",
];

/// A read-only view of the files an analyzer may inspect.
#[derive(Debug, Clone)]
pub struct ProjectView {
    root: PathBuf,
    files: Vec<PathBuf>,
}

impl ProjectView {
    /// The canonical project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All admitted files, absolute paths, sorted for determinism.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Files with the given extension (without dot).
    pub fn files_with_extension(&self, ext: &str) -> Vec<&Path> {
        self.files
            .iter()
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(ext))
            .map(|p| p.as_path())
            .collect()
    }

    /// Path relative to the project root, for reporting.
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }
}

/// Walk the project tree and admit files that pass the access policy.
///
/// The root must exist; per-entry I/O errors are skipped rather than
/// aborting the walk (a single unreadable entry is not a reason to fail
/// discovery).
pub fn collect_project(root: &Path, config: &DiscoveryConfig) -> anyhow::Result<ProjectView> {
    let canonical_root = root.canonicalize()?;
    let excludes = build_exclude_set(&config.exclude_globs)?;

    let mut files = Vec::new();

    for entry in WalkDir::new(&canonical_root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| {
            // The filter also sees the root entry; the caller chose the
            // root, so only apply the skip rules below it.
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            if e.file_type().is_dir() && name.starts_with('.') {
                return false;
            }
            if e.file_type().is_dir() && SKIPPED_DIRS.contains(&name.as_ref()) {
                return false;
            }
            true
        })
    {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !config.is_extension_allowed(ext) {
            continue;
        }

        if let Ok(rel) = path.strip_prefix(&canonical_root) {
            if excludes.is_match(rel) {
                continue;
            }
        }

        // Symlink guard: the resolved path must stay under the root.
        let resolved = match path.canonicalize() {
            Ok(p) => p,
            Err(_) => continue,
        };
        if !resolved.starts_with(&canonical_root) {
            if std::env::var("ARCHSCOUT_DEBUG").is_ok() {
                eprintln!(
                    "[debug] skipping {:?}: resolves outside project root",
                    path
                );
            }
            continue;
        }

        match fs::metadata(&resolved) {
            Ok(meta) if meta.len() <= config.max_file_size_bytes => {
                files.push(resolved);
            }
            _ => continue,
        }
    }

    files.sort();
    files.dedup();

    Ok(ProjectView {
        root: canonical_root,
        files,
    })
}

fn build_exclude_set(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
