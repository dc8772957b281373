//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code
//! - No blocking I/O inside async functions
//!
//! The helpers here walk the production sources of the workspace and give the
//! tests a line-based view of them. Everything from the first `#[cfg(test)]`
//! of a file onward is test code and is left out.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source roots, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["slidesmith/core/src", "slidesmith/cli/src"];

/// Workspace root, two levels above this package
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// Production part of one source file
#[derive(Debug)]
pub struct SourceFile {
    /// Path of the file
    pub path: PathBuf,
    /// Lines before the test module
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Lines as string slices
    #[must_use]
    pub fn line_refs(&self) -> Vec<&str> {
        self.lines.iter().map(String::as_str).collect()
    }
}

/// Read every `.rs` file under the production roots
#[must_use]
pub fn production_sources() -> Vec<SourceFile> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }

        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let Ok(content) = fs::read_to_string(entry.path()) else {
                continue;
            };
            files.push(SourceFile {
                path: entry.path().to_path_buf(),
                lines: production_lines(&content),
            });
        }
    }

    files
}

/// Lines of `content` up to the first test module
#[must_use]
pub fn production_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .take_while(|line| !line.trim().starts_with("#[cfg(test)]"))
        .map(String::from)
        .collect()
}

/// Code part of a line, comments removed
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Kind of a function signature line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FnKind {
    /// `fn`
    Sync,
    /// `async fn`
    Async,
}

/// Classify a line that starts a function, with or without visibility
#[must_use]
pub fn fn_kind(line: &str) -> Option<FnKind> {
    let mut rest = line.trim();
    for prefix in ["pub(crate) ", "pub(super) ", "pub "] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
            break;
        }
    }

    if rest.starts_with("async fn ") {
        Some(FnKind::Async)
    } else if rest.starts_with("fn ") {
        Some(FnKind::Sync)
    } else {
        None
    }
}

/// Kind of the function enclosing `lines[current_idx]`
///
/// Scans backwards to the nearest signature and stops at module boundaries.
#[must_use]
pub fn enclosing_fn(lines: &[&str], current_idx: usize) -> Option<FnKind> {
    for i in (0..=current_idx).rev() {
        if let Some(kind) = fn_kind(lines[i]) {
            return Some(kind);
        }
        let line = lines[i].trim();
        if line.starts_with("mod ") || line.starts_with("pub mod ") {
            return None;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_kind() {
        assert_eq!(fn_kind("pub async fn save_to(&self) {"), Some(FnKind::Async));
        assert_eq!(fn_kind("    fn keep_aside(text: &str) {"), Some(FnKind::Sync));
        assert_eq!(fn_kind("pub(crate) fn helper() {"), Some(FnKind::Sync));
        assert_eq!(fn_kind("let f = async move {"), None);
    }

    #[test]
    fn test_production_lines_stop_at_tests() {
        let lines = production_lines("fn a() {}\n\n#[cfg(test)]\nmod tests {}\n");
        assert_eq!(lines, vec!["fn a() {}".to_string(), String::new()]);
    }

    #[test]
    fn test_enclosing_fn() {
        let code = [
            "pub async fn load() {",
            "    let x = 1;",
            "}",
            "fn parse() {",
            "    let y = 2;",
            "}",
        ];
        assert_eq!(enclosing_fn(&code, 1), Some(FnKind::Async));
        assert_eq!(enclosing_fn(&code, 4), Some(FnKind::Sync));
    }

    #[test]
    fn test_sources_found() {
        let files = production_sources();
        assert!(
            files.iter().any(|f| f.path.ends_with("grammar.rs")),
            "production sources should include the grammar module"
        );
    }
}
