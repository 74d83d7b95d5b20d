//! Test runner summary parsing.

use regex::Regex;
use std::sync::LazyLock;

// Final summary line, e.g. "===== 3 failed, 120 passed, 2 skipped in 4.21s ====="
static SUMMARY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^=+ (.+) in [0-9.]+s\b.* =+$").unwrap());

static COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) (failed|passed|skipped|errors?|xfailed|xpassed|deselected)").unwrap()
});

static STOPPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"stopping after (\d+) failures?").unwrap());

/// Counts reported by the test runner at the end of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestSummary {
    pub passed: u32,
    pub failed: u32,
    pub errors: u32,
    pub skipped: u32,
    /// The session was interrupted by the failure ceiling.
    pub stopped_early: bool,
}

impl TestSummary {
    /// Parse captured runner output. Returns `None` when no summary line is
    /// present (the runner crashed or was killed).
    pub fn parse(output: &str) -> Option<Self> {
        let mut summary = TestSummary {
            stopped_early: STOPPED.is_match(output),
            ..Default::default()
        };

        let line = output
            .lines()
            .rev()
            .map(str::trim)
            .find_map(|line| SUMMARY_LINE.captures(line))?;

        for caps in COUNT.captures_iter(&line[1]) {
            let n: u32 = caps[1].parse().unwrap_or(0);
            match &caps[2] {
                "failed" => summary.failed = n,
                "passed" => summary.passed = n,
                "skipped" => summary.skipped = n,
                "error" | "errors" => summary.errors = n,
                _ => {}
            }
        }

        Some(summary)
    }

    /// Failures counted toward the ceiling. Collection and setup errors
    /// count the same as failed tests.
    pub fn failures(&self) -> u32 {
        self.failed + self.errors
    }
}
