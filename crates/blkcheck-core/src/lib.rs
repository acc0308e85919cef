//! Conformance engine for an externally built block-device kernel module.
//!
//! Drives the module through load, device/partition creation, attribute and
//! ioctl exposure, raw and filesystem I/O, and unload, scoring every externally
//! observable effect into one pass/fail tally.

pub mod assertions;
pub mod env;
pub mod exec;
pub mod harness;
pub mod host;
pub mod ioctl;
pub mod lifecycle;
pub mod payload;
pub mod preflight;
pub mod probes;
pub mod report;
pub mod suites;
pub mod topology;

pub use assertions::{Recorder, RunCounters, TestOutcome, Verdict};
pub use env::{HarnessConfig, HarnessEnv};
pub use exec::{CommandExecutor, CommandOutput, CommandSpec, ExecError, Privilege, SystemExecutor};
pub use harness::{reset_environment, Harness};
pub use host::{Host, LinuxHost};
pub use lifecycle::{ModuleController, ModuleHandle, ModuleSource, SettlePolicy};
pub use preflight::{locate_module, PreflightError};
pub use report::{HarnessReport, RunSummary, SuiteRecord};
pub use topology::{DeviceTopology, PathRoots};
