use crate::assertions::Recorder;
use crate::env::HarnessEnv;
use anyhow::Result;
use regex::escape;
use tracing::warn;

pub fn run(env: &HarnessEnv<'_>, rec: &mut Recorder) -> Result<()> {
    let topo = env.topology;
    let log = env.log();
    log.clear()?;

    if env.host.path_exists(&topo.proc_attr) {
        warn!(path = %topo.proc_attr.display(), "proc attribute exists before module load");
        rec.line("WARNING: Proc file exists before module load");
    }
    if env.host.path_exists(&topo.sysfs_attr) {
        warn!(path = %topo.sysfs_attr.display(), "sysfs attribute exists before module load");
        rec.line("WARNING: Sysfs file exists before module load");
    }

    let session = env.module.session()?;
    if !session.load_output().success() {
        rec.line(format_args!(
            "Load command exited {}: {}",
            session.load_output().code,
            session.load_output().stderr
        ));
    }

    let dev = escape(&topo.name);
    // Nothing below is meaningful without the init message and the base node.
    if !rec.assert_log_contains(
        &log,
        &format!("{dev}.*Initializing|module loaded"),
        "Module initialization",
    )? {
        return Ok(());
    }
    if !rec.assert_path_exists(env.host, &topo.device, "Block device creation") {
        return Ok(());
    }

    for part in &topo.partitions {
        rec.assert_path_exists(
            env.host,
            part,
            &format!("Partition device {}", part.display()),
        );
    }

    if !rec.assert_path_exists(env.host, &topo.proc_attr, "Proc file creation") {
        return Ok(());
    }
    rec.assert_path_exists(env.host, &topo.sysfs_attr, "Sysfs file creation");

    session.unload()?;
    rec.assert_log_contains(
        &log,
        &format!("{dev}.*unloaded|module unloaded"),
        "Module unloading",
    )?;
    Ok(())
}
