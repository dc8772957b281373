//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async functions in production code MUST NOT use blocking I/O.
//! **Required**: `tokio::fs`, `tokio::io`, async `reqwest`; not `std::fs`,
//! `std::net`, `std::process::Command` or `reqwest::blocking`.
//!
//! Blocking calls in plain functions are acceptable: configuration loading
//! runs once before any stream is opened.

use architectural_enforcement::{code_part, enclosing_fn, production_sources, FnKind};

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let violations = find_blocking_io_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in async production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::fs::read_to_string().await, tokio::fs::write().await");
        eprintln!("  - tokio::io::stdin(), tokio::io::stdout()");
        eprintln!("  - reqwest::Client::post().send().await");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

fn find_blocking_io_violations() -> Vec<String> {
    let mut violations = Vec::new();

    for file in production_sources() {
        let lines = file.line_refs();
        for (idx, line) in lines.iter().enumerate() {
            if enclosing_fn(&lines, idx) != Some(FnKind::Async) {
                continue;
            }
            if let Some(kind) = blocking_call(code_part(line)) {
                violations.push(format!(
                    "{}:{} - {kind}: {}",
                    file.path.display(),
                    idx + 1,
                    line.trim()
                ));
            }
        }
    }

    violations
}

/// Name of the blocking call on this line, if any
fn blocking_call(code: &str) -> Option<&'static str> {
    if code.contains("std::fs::") {
        Some("Blocking file I/O")
    } else if code.contains("std::net::") {
        Some("Blocking network I/O")
    } else if code.contains("std::process::Command") {
        Some("Blocking process I/O")
    } else if code.contains("reqwest::blocking") {
        Some("Blocking HTTP client")
    } else if code.contains("std::io::stdin()") || code.contains("std::io::stdout()") {
        Some("Blocking stdin/stdout")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_io_detection() {
        let test_code = [
            "async fn bad_function() {",
            "    let contents = std::fs::read_to_string(\"file.txt\")?;",
            "}",
        ];

        assert_eq!(enclosing_fn(&test_code, 1), Some(FnKind::Async));
        assert_eq!(blocking_call(test_code[1]), Some("Blocking file I/O"));
    }

    #[test]
    fn test_non_async_function_allowed() {
        let test_code = [
            "pub fn load_config() {",
            "    let contents = std::fs::read_to_string(\"config.toml\")?;",
            "}",
        ];

        assert_eq!(enclosing_fn(&test_code, 1), Some(FnKind::Sync));
    }

    #[test]
    fn test_async_io_not_flagged() {
        assert_eq!(blocking_call("tokio::fs::write(path, json).await?;"), None);
        assert_eq!(blocking_call("let mut stdin = tokio::io::stdin();"), None);
    }
}
