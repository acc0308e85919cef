use anyhow::{Context, Result};
use blkcheck_core::{
    locate_module, Harness, HarnessConfig, HarnessReport, LinuxHost, PreflightError, Privilege,
    Recorder, SettlePolicy,
};
use clap::Parser;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod args;
mod escalate;
pub mod exit_codes;

use args::Cli;

fn main() {
    // Diagnostics go to stderr; stdout carries the report.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fatal: {e:?}");
            exit_codes::INTERNAL_ERROR
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let release = nix::sys::utsname::uname()
        .context("reading kernel release")?
        .release()
        .to_string_lossy()
        .into_owned();
    let cwd = std::env::current_dir().context("resolving working directory")?;

    let source = match locate_module(&cli.module, &release, &cwd) {
        Ok(source) => source,
        Err(e @ PreflightError::ModuleNotFound { .. }) => {
            eprintln!("[!] Error: Module file {}.ko not found", cli.module);
            eprintln!("Please build the module first using 'make'");
            tracing::debug!(error = %e, "pre-flight failed");
            return Ok(exit_codes::MODULE_NOT_FOUND);
        }
        Err(e) => return Err(e.into()),
    };

    if !nix::unistd::geteuid().is_root() {
        if !cli.no_sudo {
            escalate::reexec_as_root()?;
        }
        tracing::warn!("running unprivileged: ioctl and kernel log checks will likely be denied");
    }
    // Root from here on, or explicitly opted out of sudo.
    let privilege = Privilege::Direct;
    tracing::info!(module = %cli.module, ?source, ?privilege, "starting conformance run");

    let settle = SettlePolicy {
        load_timeout: Duration::from_millis(cli.settle_timeout_ms),
        ..SettlePolicy::default()
    };
    let config = HarnessConfig::new(&cli.module, source)
        .with_device_name(&cli.device_name)
        .with_settle(settle);
    let topology = config.topology();
    let host = LinuxHost::new(privilege);

    let harness = Harness::new(&host, &topology, config)?;
    // JSON on stdout replaces the text report so stdout stays parseable.
    let recorder = if cli.json_on_stdout() {
        Recorder::new(Box::new(std::io::sink()))
    } else {
        Recorder::stdout()
    };
    let report = harness.run(recorder);

    if let Some(path) = &cli.report {
        write_report(&report, path)?;
    }
    Ok(if report.passed() {
        exit_codes::SUCCESS
    } else {
        exit_codes::TESTS_FAILED
    })
}

fn write_report(report: &HarnessReport, path: &Path) -> Result<()> {
    let json = report.to_json().context("serializing report")?;
    if path == Path::new("-") {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{json}")?;
        out.flush()?;
    } else {
        std::fs::write(path, json)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }
    Ok(())
}
