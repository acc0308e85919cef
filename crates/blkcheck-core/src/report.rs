use crate::assertions::{RunCounters, TestOutcome};
use serde::Serialize;

#[derive(Debug, Serialize, Clone)]
pub struct HarnessReport {
    pub module: String,
    pub device: String,
    pub summary: RunSummary,
    pub suites: Vec<SuiteRecord>,
    pub outcomes: Vec<TestOutcome>,
    pub exit_code: i32,
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct RunSummary {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub tolerated: u64,
    pub success_rate: Option<f64>,
}

impl From<RunCounters> for RunSummary {
    fn from(c: RunCounters) -> Self {
        Self {
            total: c.total,
            passed: c.passed,
            failed: c.failed,
            tolerated: c.tolerated,
            success_rate: c.success_rate(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct SuiteRecord {
    pub name: String,
    pub duration_ms: u64,
    /// Set when the suite aborted; the abort is also one failed outcome.
    pub error: Option<String>,
}

impl HarnessReport {
    pub fn passed(&self) -> bool {
        self.summary.failed == 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
