use crate::assertions::Recorder;
use crate::env::HarnessEnv;
use crate::exec::CommandSpec;
use crate::payload::{self, PAYLOAD_LEN};
use crate::topology::SECTOR_SIZE;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

fn dd(input: &Path, output: &Path) -> CommandSpec {
    CommandSpec::new("dd")
        .arg(format!("if={}", input.display()))
        .arg(format!("of={}", output.display()))
        .arg(format!("bs={SECTOR_SIZE}"))
        .arg(format!("count={}", PAYLOAD_LEN as u64 / SECTOR_SIZE))
        .privileged()
}

/// Writes `data` at sector `offset` of `device`, reads it back and compares.
///
/// A failed write or read is scored by its own assertion and skips the compare.
pub(crate) fn round_trip(
    env: &HarnessEnv<'_>,
    rec: &mut Recorder,
    device: &Path,
    offset: u64,
    data: &[u8],
    label: &str,
) -> Result<bool> {
    let mut source = tempfile::Builder::new()
        .prefix("payload-")
        .tempfile_in(env.scratch())
        .context("creating payload file")?;
    source.write_all(data).context("writing payload file")?;
    source.flush()?;
    let readback = tempfile::Builder::new()
        .prefix("readback-")
        .tempfile_in(env.scratch())
        .context("creating read-back file")?;

    let mut write = dd(source.path(), device);
    let mut read = dd(device, readback.path());
    if offset > 0 {
        write = write.arg(format!("seek={offset}"));
        read = read.arg(format!("skip={offset}"));
    }

    let (ok, _) = rec.assert_command_success(env.host, &write, &format!("Write to {label}"))?;
    if !ok {
        return Ok(false);
    }
    let (ok, _) = rec.assert_command_success(env.host, &read, &format!("Read from {label}"))?;
    if !ok {
        return Ok(false);
    }

    let description = format!("Compare written and read data for {label}");
    Ok(match std::fs::read(readback.path()) {
        Ok(back) => rec.assert_bytes_equal(&description, data, &back),
        Err(e) => rec.assert_condition(
            "read-back file",
            &description,
            format_args!("{} bytes", data.len()),
            format_args!("unreadable: {e}"),
            false,
        ),
    })
}

pub fn run(env: &HarnessEnv<'_>, rec: &mut Recorder) -> Result<()> {
    let _session = env.module.session()?;
    // Sector 0 is the boot-sector-style header; data starts at sector 1.
    round_trip(
        env,
        rec,
        &env.topology.device,
        1,
        &payload::whole_device(),
        "block device after MBR",
    )?;
    Ok(())
}
