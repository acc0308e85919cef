use crate::assertions::Recorder;
use crate::env::HarnessEnv;
use crate::probes::{attribute_read, attribute_write};
use anyhow::Result;
use std::path::Path;

const CAPACITY_MARKER: &str = "Capacity:";

pub fn run(env: &HarnessEnv<'_>, rec: &mut Recorder) -> Result<()> {
    let log = env.log();
    log.clear()?;
    let _session = env.module.session()?;

    check_attribute(env, rec, &env.topology.proc_attr, "proc")?;
    check_attribute(env, rec, &env.topology.sysfs_attr, "sysfs")?;
    Ok(())
}

fn check_attribute(
    env: &HarnessEnv<'_>,
    rec: &mut Recorder,
    path: &Path,
    kind: &str,
) -> Result<()> {
    let (ok, out) = rec.assert_command_success(
        env.host,
        &attribute_read(path),
        &format!("Read from {kind} file"),
    )?;
    if ok {
        rec.assert_condition(
            format_args!("{kind} file content"),
            &format!("{kind} file reports capacity"),
            format_args!("contains '{CAPACITY_MARKER}'"),
            &out.stdout,
            out.stdout.contains(CAPACITY_MARKER),
        );
    }

    rec.assert_command_success(
        env.host,
        &attribute_write(path, &format!("Test write to {kind} file")),
        &format!("Write to {kind} file"),
    )?;
    rec.assert_log_contains(
        &env.log(),
        &format!("Written to {kind} file"),
        &format!("Verify {kind} file write in dmesg"),
    )?;
    Ok(())
}
