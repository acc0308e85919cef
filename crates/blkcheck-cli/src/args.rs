use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "blkcheck",
    version,
    about = "Conformance harness for a block-device kernel module: load, probe, read/write, unload"
)]
pub struct Cli {
    /// Module name without the .ko extension (e.g. ex_blk)
    pub module: String,

    /// Block device name the module registers, if it differs from the default
    #[arg(long, env = "BLKCHECK_DEVICE", default_value = "ex_blk")]
    pub device_name: String,

    /// Run as the current user instead of re-running under sudo
    #[arg(long)]
    pub no_sudo: bool,

    /// How long to wait for device nodes after load, in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub settle_timeout_ms: u64,

    /// Also write the run as JSON to this path ("-" for stdout, replacing the text report)
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl Cli {
    /// `--report -`: the JSON report takes over stdout.
    pub fn json_on_stdout(&self) -> bool {
        self.report.as_deref() == Some(Path::new("-"))
    }
}
