//! Re-running the harness as root.
//!
//! The ioctl probes open the device node from this process, and dmesg may be
//! restricted, so per-command `sudo` is not enough: the whole run needs root.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

/// Variables the root run must still see.
const PRESERVED_ENV: &str = "RUST_LOG,BLKCHECK_DEVICE";

/// `sudo` argv that re-runs `exe` with the original arguments.
pub fn sudo_argv(exe: &Path, args: &[OsString]) -> Vec<OsString> {
    let mut argv = vec![
        OsString::from(format!("--preserve-env={PRESERVED_ENV}")),
        OsString::from("--"),
        exe.as_os_str().to_owned(),
    ];
    argv.extend(args.iter().cloned());
    argv
}

/// Replaces this process with `sudo <self> <args>`. Returns only on failure.
pub fn reexec_as_root() -> Result<()> {
    let exe = std::env::current_exe().context("locating the blkcheck binary")?;
    let args: Vec<OsString> = std::env::args_os().skip(1).collect();
    tracing::info!(exe = %exe.display(), "not root, re-running under sudo");
    let err = Command::new("sudo").args(sudo_argv(&exe, &args)).exec();
    Err(err).context("re-running under sudo (pass --no-sudo to run unprivileged)")
}
