//! Fixed test-runner policy.

use serde::{Deserialize, Serialize};

/// How the test suite is run for every cell.
///
/// The flags are not configurable per cell: report all outcomes, stop after
/// `max_failures` failing tests, escalate warnings to errors, verbose output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPolicy {
    pub max_failures: u32,
}

impl Default for TestPolicy {
    fn default() -> Self {
        Self { max_failures: 10 }
    }
}

impl TestPolicy {
    pub fn flags(&self) -> Vec<String> {
        vec![
            "-ra".to_string(),
            format!("--maxfail={}", self.max_failures),
            "-W".to_string(),
            "error".to_string(),
            "-vv".to_string(),
        ]
    }

    /// Whether `failures` means the runner stopped at the ceiling.
    pub fn reached_ceiling(&self, failures: u32) -> bool {
        failures >= self.max_failures
    }
}
