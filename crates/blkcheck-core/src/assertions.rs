//! Assertion primitives and the running tally they feed.
//!
//! Every primitive bumps `total` and exactly one of `passed`/`failed`, prints a
//! per-test block and hands its verdict back to the suite.

use crate::exec::{CommandOutput, CommandSpec, ExecError};
use crate::host::Host;
use crate::probes::KernelLog;
use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::fmt::Display;
use std::io::{self, Write};
use std::path::Path;

const LOG_TAIL_CHARS: usize = 500;
const HEX_PREVIEW_BYTES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Pass,
    Fail,
    /// Either outcome is valid driver behavior; counted as passed, tracked apart.
    AcceptedEither,
}

impl Verdict {
    pub fn is_pass(self) -> bool {
        !matches!(self, Verdict::Fail)
    }

    fn label(self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::AcceptedEither => "ACCEPTED_EITHER",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    pub seq: u64,
    pub suite: String,
    pub description: String,
    pub expected: String,
    pub observed: String,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    /// Subset of `passed` scored `AcceptedEither`.
    pub tolerated: u64,
}

impl RunCounters {
    /// Percentage of passed tests, `None` before any test ran.
    pub fn success_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.passed as f64 / self.total as f64 * 100.0)
    }
}

pub struct Recorder {
    counters: RunCounters,
    outcomes: Vec<TestOutcome>,
    suite: String,
    out: Box<dyn Write>,
}

impl Recorder {
    pub fn new(out: Box<dyn Write>) -> Self {
        Self {
            counters: RunCounters::default(),
            outcomes: Vec::new(),
            suite: String::new(),
            out,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn outcomes(&self) -> &[TestOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<TestOutcome> {
        self.outcomes
    }

    /// Writes a free-form line to the report stream (headers, notes).
    pub fn line(&mut self, text: impl Display) {
        // A closed stdout must not abort a run holding a loaded module.
        let _ = writeln!(self.out, "{text}");
    }

    pub fn note(&mut self, text: impl Display) {
        self.line(format_args!("Additional check: {text}"));
    }

    pub fn begin_suite(&mut self, name: &str, title: &str) {
        self.suite = name.to_string();
        self.line(format_args!("\n=== {title} ==="));
    }

    fn record(
        &mut self,
        description: &str,
        expected: String,
        observed: String,
        verdict: Verdict,
    ) -> Verdict {
        self.counters.total += 1;
        match verdict {
            Verdict::Pass => self.counters.passed += 1,
            Verdict::AcceptedEither => {
                self.counters.passed += 1;
                self.counters.tolerated += 1;
            }
            Verdict::Fail => self.counters.failed += 1,
        }
        self.outcomes.push(TestOutcome {
            seq: self.counters.total,
            suite: self.suite.clone(),
            description: description.to_string(),
            expected,
            observed,
            verdict,
        });
        verdict
    }

    fn header(&mut self, kind: &str, subject: impl Display, description: &str) {
        let seq = self.counters.total + 1;
        self.line(format_args!("\nTest #{seq}"));
        self.line(format_args!("{:<12}{subject}", format!("{kind}:")));
        if !description.is_empty() {
            self.line(format_args!("Description:{description}"));
        }
    }

    fn result_line(&mut self, verdict: Verdict, suffix: &str) {
        if suffix.is_empty() {
            self.line(format_args!("Result:     {}", verdict.label()));
        } else {
            self.line(format_args!("Result:     {} - {suffix}", verdict.label()));
        }
    }

    /// Generic expected-vs-observed check.
    pub fn assert_condition(
        &mut self,
        check: impl Display,
        description: &str,
        expected: impl Display,
        observed: impl Display,
        ok: bool,
    ) -> bool {
        let (expected, observed) = (expected.to_string(), observed.to_string());
        self.header("Check", check, description);
        self.line(format_args!("Expected:   {expected}"));
        self.line(format_args!("Found:      {observed}"));
        let verdict = if ok { Verdict::Pass } else { Verdict::Fail };
        self.result_line(verdict, "");
        self.record(description, expected, observed, verdict).is_pass()
    }

    /// Passes iff `pattern` matches anywhere in the current ring buffer.
    pub fn assert_log_contains(
        &mut self,
        log: &KernelLog<'_>,
        pattern: &str,
        description: &str,
    ) -> Result<bool> {
        let re = Regex::new(pattern).with_context(|| format!("invalid log pattern {pattern:?}"))?;
        let text = log.read().context("reading kernel log")?;
        let found = re.is_match(&text);

        self.header("Command", description, "");
        self.line(format_args!("Expected:   Pattern '{pattern}'"));
        self.line(format_args!("Found:      {}", if found { "Yes" } else { "No" }));
        let verdict = if found { Verdict::Pass } else { Verdict::Fail };
        self.result_line(verdict, "");
        if !found {
            self.line("Debug info:");
            self.line(log_tail(&text, LOG_TAIL_CHARS));
        }
        Ok(self
            .record(
                description,
                format!("pattern '{pattern}'"),
                if found { "matched" } else { "no match" }.to_string(),
                verdict,
            )
            .is_pass())
    }

    /// Passes iff the command exits zero. The output comes back either way.
    pub fn assert_command_success(
        &mut self,
        host: &dyn Host,
        spec: &CommandSpec,
        description: &str,
    ) -> Result<(bool, CommandOutput), ExecError> {
        let out = host.execute(spec)?;
        self.header("Command", spec, description);
        let verdict = if out.success() {
            Verdict::Pass
        } else {
            Verdict::Fail
        };
        self.result_line(verdict, "");
        if !out.success() {
            self.line(format_args!("Return code: {}", out.code));
            if !out.stderr.is_empty() {
                self.line(format_args!("Error: {}", out.stderr));
            }
        }
        let ok = self
            .record(
                description,
                "exit 0".to_string(),
                format!("exit {}", out.code),
                verdict,
            )
            .is_pass();
        Ok((ok, out))
    }

    /// Inverted polarity: passes iff the command exits non-zero.
    pub fn assert_command_fails(
        &mut self,
        host: &dyn Host,
        spec: &CommandSpec,
        description: &str,
    ) -> Result<(bool, CommandOutput), ExecError> {
        let out = host.execute(spec)?;
        self.header("Command", spec, description);
        self.exit_details(&out);
        let verdict = if out.success() {
            self.result_line(Verdict::Fail, "should have failed but succeeded");
            Verdict::Fail
        } else {
            self.result_line(Verdict::Pass, "correctly failed as expected");
            Verdict::Pass
        };
        let ok = self
            .record(
                description,
                "non-zero exit".to_string(),
                format!("exit {}", out.code),
                verdict,
            )
            .is_pass();
        Ok((ok, out))
    }

    /// Dual acceptance: success and failure are both valid; the report says which.
    pub fn assert_accepted_either(
        &mut self,
        host: &dyn Host,
        spec: &CommandSpec,
        description: &str,
        on_success: &str,
        on_failure: &str,
    ) -> Result<CommandOutput, ExecError> {
        let out = host.execute(spec)?;
        self.header("Command", spec, description);
        self.exit_details(&out);
        let how = if out.success() { on_success } else { on_failure };
        self.result_line(Verdict::AcceptedEither, how);
        self.record(
            description,
            "either outcome".to_string(),
            format!("exit {} ({how})", out.code),
            Verdict::AcceptedEither,
        );
        Ok(out)
    }

    fn exit_details(&mut self, out: &CommandOutput) {
        self.line(format_args!("Return code: {}", out.code));
        let detail = if out.stderr.is_empty() {
            &out.stdout
        } else {
            &out.stderr
        };
        if !detail.is_empty() {
            self.line(format_args!("Error output: {detail}"));
        }
    }

    pub fn assert_path_exists(&mut self, host: &dyn Host, path: &Path, description: &str) -> bool {
        let exists = host.path_exists(path);
        self.header("Check", format_args!("File existence: {}", path.display()), description);
        let verdict = if exists { Verdict::Pass } else { Verdict::Fail };
        self.result_line(verdict, "");
        self.record(
            description,
            format!("{} exists", path.display()),
            if exists { "present" } else { "absent" }.to_string(),
            verdict,
        )
        .is_pass()
    }

    /// Byte-exact comparison with a diagnostic preview on mismatch.
    pub fn assert_bytes_equal(&mut self, description: &str, expected: &[u8], actual: &[u8]) -> bool {
        self.header("Command", description, "");
        let equal = expected == actual;
        if equal {
            self.result_line(Verdict::Pass, "");
            self.line("Data comparison: SUCCESS - exact match");
            return self
                .record(
                    description,
                    format!("{} bytes", expected.len()),
                    "exact match".to_string(),
                    Verdict::Pass,
                )
                .is_pass();
        }

        self.result_line(Verdict::Fail, "");
        self.line(format_args!(
            "Data length: original={}, read={}",
            expected.len(),
            actual.len()
        ));
        let offset = first_difference(expected, actual);
        self.line(format_args!("First difference at byte {offset}"));
        self.line(format_args!(
            "First {HEX_PREVIEW_BYTES} bytes original: {}",
            hex_preview(expected)
        ));
        self.line(format_args!(
            "First {HEX_PREVIEW_BYTES} bytes read:     {}",
            hex_preview(actual)
        ));
        let padding_only = trim_trailing_zeros(expected) == trim_trailing_zeros(actual);
        if padding_only {
            self.line("Note: Data matches when ignoring trailing zeros");
        }
        self.record(
            description,
            format!("{} bytes", expected.len()),
            format!(
                "{} bytes, first difference at {offset}{}",
                actual.len(),
                if padding_only { " (trailing zeros only)" } else { "" }
            ),
            Verdict::Fail,
        )
        .is_pass()
    }

    /// Scores an infrastructure failure (a suite that could not finish).
    pub fn record_failure(&mut self, description: &str, detail: impl Display) {
        let detail = detail.to_string();
        self.header("Check", description, "");
        self.line(format_args!("Error:      {detail}"));
        self.result_line(Verdict::Fail, "");
        self.record(description, "suite completes".to_string(), detail, Verdict::Fail);
    }

    /// Scores a check the device may legitimately not support.
    pub fn record_optional(&mut self, check: impl Display, description: &str, status: impl Display) {
        let status = status.to_string();
        self.header("Check", check, description);
        self.line(format_args!("Status:     Not supported - {status}"));
        self.result_line(Verdict::Pass, "optional feature");
        self.record(
            description,
            "supported or declined".to_string(),
            format!("not supported: {status}"),
            Verdict::Pass,
        );
    }

    /// Prints the closing block and returns the process exit status.
    pub fn print_summary(&mut self) -> i32 {
        let c = self.counters;
        self.line("\n=== Test Summary ===");
        self.line(format_args!("Total tests:  {}", c.total));
        self.line(format_args!("Passed:       {}", c.passed));
        self.line(format_args!("Failed:       {}", c.failed));
        self.line(format_args!("Tolerated:    {}", c.tolerated));
        match c.success_rate() {
            Some(rate) => self.line(format_args!("Success rate: {rate:.1}%")),
            None => self.line("Success rate: N/A"),
        }
        let code = if c.failed == 0 {
            self.line("\nFINAL RESULT: ALL TESTS PASSED");
            0
        } else {
            self.line("\nFINAL RESULT: SOME TESTS FAILED");
            1
        };
        let _ = self.out.flush();
        code
    }
}

fn log_tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    let start = text.char_indices().nth(skip).map(|(i, _)| i).unwrap_or(0);
    &text[start..]
}

fn hex_preview(data: &[u8]) -> String {
    hex::encode(&data[..data.len().min(HEX_PREVIEW_BYTES)])
}

fn first_difference(a: &[u8], b: &[u8]) -> usize {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .unwrap_or_else(|| a.len().min(b.len()))
}

fn trim_trailing_zeros(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &data[..end]
}
