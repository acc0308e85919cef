use crate::assertions::Recorder;
use crate::env::HarnessEnv;
use crate::exec::CommandSpec;
use crate::topology::SECTOR_SIZE;
use anyhow::Result;

pub fn run(env: &HarnessEnv<'_>, rec: &mut Recorder) -> Result<()> {
    let topo = env.topology;
    let _session = env.module.session()?;
    let device = topo.device.display().to_string();

    let overflow = CommandSpec::new("dd")
        .arg("if=/dev/zero")
        .arg(format!("of={device}"))
        .arg("bs=1M")
        .arg(format!("count={}", topo.overflow_mib()))
        .arg("oflag=direct")
        .privileged();
    rec.assert_command_fails(
        env.host,
        &overflow,
        "Write beyond device capacity (expected to fail)",
    )?;

    // Out-of-range reads may zero-fill or error; both are valid drivers.
    let far_read = CommandSpec::new("dd")
        .arg(format!("if={device}"))
        .arg("of=/dev/null")
        .arg(format!("bs={SECTOR_SIZE}"))
        .arg("count=1")
        .arg(format!("skip={}", topo.far_sector()))
        .privileged();
    rec.assert_accepted_either(
        env.host,
        &far_read,
        "Read from non-existent sector",
        "completed successfully (returned zeros)",
        "failed as expected (sector out of range)",
    )?;
    Ok(())
}
