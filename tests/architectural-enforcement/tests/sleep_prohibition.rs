//! Integration Test: Sleep Prohibition
//!
//! **Policy**: production code MUST NOT call sleep methods. Streams wait on
//! I/O and cancellation tokens, never on timers.
//! **Exceptions**: exponential backoff in retry logic, test code.

use architectural_enforcement::{code_part, production_sources};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ ACCEPTABLE sleep uses:");
        eprintln!("  - Exponential backoff in retry logic");
        eprintln!("  - Test code (#[test] or #[tokio::test] functions)");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");
        eprintln!("  - Sleep to 'wait' for stream data (await the stream!)");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

fn find_sleep_violations() -> Vec<String> {
    let mut violations = Vec::new();

    for file in production_sources() {
        let lines = file.line_refs();
        for (idx, line) in lines.iter().enumerate() {
            let code = code_part(line);
            if !(code.contains("::sleep(") || code.contains(".sleep(")) {
                continue;
            }
            if is_backoff_context(&lines, idx) {
                continue;
            }
            violations.push(format!(
                "{}:{} - {}",
                file.path.display(),
                idx + 1,
                line.trim()
            ));
        }
    }

    violations
}

/// Check if sleep is used for exponential backoff (acceptable for retry logic)
fn is_backoff_context(lines: &[&str], current_idx: usize) -> bool {
    let context_range = current_idx.saturating_sub(15)..std::cmp::min(current_idx + 5, lines.len());

    let mut has_backoff_calc = false;
    let mut has_retry_context = false;

    for line in &lines[context_range] {
        let line = line.to_lowercase();

        // Exponential backoff calculation (2^n pattern or bit shift)
        if line.contains("<<") || line.contains("pow") || line.contains("* 2") {
            has_backoff_calc = true;
        }

        if line.contains("retry") || line.contains("backoff") || line.contains("attempt") {
            has_retry_context = true;
        }
    }

    has_backoff_calc && has_retry_context
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_detection() {
        let test_code = [
            "async fn reconnect() {",
            "    let delay = base_delay * (1 << attempt);",
            "    tracing::warn!(attempt, \"Retrying\");",
            "    tokio::time::sleep(Duration::from_millis(delay)).await;",
            "}",
        ];

        assert!(
            is_backoff_context(&test_code, 3),
            "Should detect exponential backoff pattern"
        );
    }

    #[test]
    fn test_plain_sleep_not_backoff() {
        let test_code = [
            "async fn poll() {",
            "    loop {",
            "        tokio::time::sleep(Duration::from_millis(50)).await;",
            "    }",
            "}",
        ];

        assert!(!is_backoff_context(&test_code, 2));
    }
}
