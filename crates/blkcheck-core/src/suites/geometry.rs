use crate::assertions::Recorder;
use crate::env::HarnessEnv;
use crate::exec::CommandSpec;
use crate::topology::PARTITION_COUNT;
use anyhow::Result;
use std::path::Path;
use tracing::warn;

fn getsize64(path: &Path) -> CommandSpec {
    CommandSpec::new("blockdev")
        .arg("--getsize64")
        .arg(path.display().to_string())
        .privileged()
}

/// Partitions named in an `fdisk -l` listing.
pub fn listed_partitions(listing: &str, device_name: &str) -> usize {
    (1..=PARTITION_COUNT)
        .filter(|i| {
            let node = format!("{device_name}{i}");
            listing
                .split_whitespace()
                .any(|tok| tok.rsplit('/').next() == Some(node.as_str()))
        })
        .count()
}

pub fn run(env: &HarnessEnv<'_>, rec: &mut Recorder) -> Result<()> {
    let topo = env.topology;
    let log = env.log();
    log.clear()?;
    let _session = env.module.session()?;

    let (ok, out) = rec.assert_command_success(
        env.host,
        &CommandSpec::new("fdisk")
            .arg("-l")
            .arg(topo.device.display().to_string())
            .privileged(),
        "Check block device with fdisk",
    )?;
    if !ok {
        return Ok(());
    }
    let seen = listed_partitions(&out.stdout, &topo.name);
    rec.assert_condition(
        "fdisk partition table",
        "Partitions detected in fdisk output",
        format_args!("{PARTITION_COUNT} partitions"),
        format_args!("{seen} partitions"),
        seen == PARTITION_COUNT,
    );

    check_size(env, rec, &topo.device, "Get total device size", topo.total_size)?;
    for (i, part) in topo.partitions.iter().enumerate() {
        check_size(
            env,
            rec,
            part,
            &format!("Get partition {} size", i + 1),
            topo.partition_size,
        )?;
    }

    let text = log.read()?;
    if text.contains("truncated") {
        warn!(device = %topo.name, "partition truncation reported in kernel log");
        rec.note("WARNING - Partition truncation detected in dmesg");
    } else {
        rec.note("No partition truncation warnings in dmesg");
    }
    Ok(())
}

fn check_size(
    env: &HarnessEnv<'_>,
    rec: &mut Recorder,
    path: &Path,
    description: &str,
    expected: u64,
) -> Result<()> {
    let (ok, out) = rec.assert_command_success(env.host, &getsize64(path), description)?;
    if !ok {
        return Ok(());
    }
    let size = out.stdout.trim().parse::<u64>().ok();
    let observed = match size {
        Some(n) => format!("{n} bytes"),
        None => format!("unparseable output {:?}", out.stdout),
    };
    rec.assert_condition(
        format_args!("size of {}", path.display()),
        &format!("{} exactly {expected} bytes", path.display()),
        format_args!("{expected} bytes"),
        observed,
        size == Some(expected),
    );
    Ok(())
}
