//! Orchestrates one full conformance run.

use crate::assertions::Recorder;
use crate::env::{HarnessConfig, HarnessEnv};
use crate::host::Host;
use crate::report::{HarnessReport, SuiteRecord};
use crate::suites::{filesystem, Suite, SUITES};
use crate::topology::DeviceTopology;
use anyhow::Result;
use std::time::Instant;
use tracing::{error, info, warn};

/// Puts the machine back to "module unloaded, nothing mounted".
///
/// Idempotent and never scored: every step tolerates failure.
pub fn reset_environment(env: &HarnessEnv<'_>) {
    let targets = env.topology.mount_targets();
    for (device, mount_point) in &targets {
        for target in [device, mount_point] {
            if let Err(e) = env.run_quiet(&filesystem::unmount(target)) {
                warn!(error = %e, "unmount during reset failed");
            }
        }
    }
    for (_, mount_point) in &targets {
        if let Err(e) = env.run_quiet(&filesystem::remove_dir(mount_point)) {
            warn!(error = %e, "mount point removal during reset failed");
        }
    }
    if let Err(e) = env.module.unload() {
        warn!(error = %e, "unload during reset failed");
    }
}

pub struct Harness<'h> {
    env: HarnessEnv<'h>,
    config: HarnessConfig,
    suites: &'static [Suite],
}

impl<'h> Harness<'h> {
    pub fn new(host: &'h dyn Host, topology: &'h DeviceTopology, config: HarnessConfig) -> Result<Self> {
        Ok(Self {
            env: HarnessEnv::new(host, topology, &config)?,
            config,
            suites: SUITES,
        })
    }

    /// Restricts the run to a custom suite list (still in the given order).
    pub fn with_suites(mut self, suites: &'static [Suite]) -> Self {
        self.suites = suites;
        self
    }

    pub fn env(&self) -> &HarnessEnv<'h> {
        &self.env
    }

    /// Reset, every suite in order, reset again, summary.
    ///
    /// A suite that errors becomes one failed outcome; later suites still run.
    pub fn run(&self, mut rec: Recorder) -> HarnessReport {
        rec.line(format_args!(
            "=== Testing {} Block Device Module ===",
            self.env.topology.name
        ));
        reset_environment(&self.env);

        let mut records = Vec::with_capacity(self.suites.len());
        for suite in self.suites {
            info!(suite = suite.name, "running suite");
            rec.begin_suite(suite.name, suite.title);
            let start = Instant::now();
            let result = (suite.run)(&self.env, &mut rec);
            let error = match result {
                Ok(()) => None,
                Err(e) => {
                    error!(suite = suite.name, error = %format!("{e:#}"), "suite aborted");
                    rec.record_failure(&format!("Suite '{}' completes", suite.name), format_args!("{e:#}"));
                    Some(format!("{e:#}"))
                }
            };
            records.push(SuiteRecord {
                name: suite.name.to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
                error,
            });
        }

        reset_environment(&self.env);

        let exit_code = rec.print_summary();
        let summary = rec.counters().into();
        HarnessReport {
            module: self.config.module_name.clone(),
            device: self.env.topology.device.display().to_string(),
            summary,
            suites: records,
            outcomes: rec.into_outcomes(),
            exit_code,
        }
    }
}
