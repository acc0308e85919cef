use crate::assertions::Recorder;
use crate::env::HarnessEnv;
use crate::exec::CommandSpec;
use crate::host::Host;
use crate::probes::{attribute_read, attribute_write};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::warn;

const TEST_FILE: &str = "test_file.txt";
const TEST_CONTENT: &str = "Test content for filesystem verification\n";

pub fn unmount(target: &Path) -> CommandSpec {
    CommandSpec::new("umount")
        .arg(target.display().to_string())
        .privileged()
}

pub fn remove_dir(path: &Path) -> CommandSpec {
    CommandSpec::new("rm")
        .arg("-rf")
        .arg(path.display().to_string())
        .privileged()
}

/// Owns a mount point directory; dropping it unmounts (if still mounted)
/// and removes the directory.
pub struct MountPoint<'h> {
    host: &'h dyn Host,
    path: PathBuf,
}

impl<'h> MountPoint<'h> {
    pub fn create(host: &'h dyn Host, path: PathBuf) -> Result<Self> {
        host.execute(
            &CommandSpec::new("mkdir")
                .arg("-p")
                .arg(path.display().to_string())
                .privileged(),
        )?;
        Ok(Self { host, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MountPoint<'_> {
    fn drop(&mut self) {
        for spec in [unmount(&self.path), remove_dir(&self.path)] {
            if let Err(e) = self.host.execute(&spec) {
                warn!(command = %spec, error = %e, "mount point cleanup failed");
            }
        }
    }
}

pub fn run(env: &HarnessEnv<'_>, rec: &mut Recorder) -> Result<()> {
    let topo = env.topology;
    let _session = env.module.session()?;
    let Some(part) = topo.partition(1) else {
        return Ok(());
    };
    let part_arg = part.display().to_string();
    // Declared after the session so it drops (unmounts) first.
    let mount = MountPoint::create(env.host, topo.mount_point(1))?;
    let mount_arg = mount.path().display().to_string();

    let (ok, _) = rec.assert_command_success(
        env.host,
        &CommandSpec::new("mkfs.ext4")
            .arg("-F")
            .arg(&part_arg)
            .privileged(),
        "Create ext4 filesystem on partition 1",
    )?;
    if !ok {
        return Ok(());
    }

    let (ok, _) = rec.assert_command_success(
        env.host,
        &CommandSpec::new("mount")
            .arg(&part_arg)
            .arg(&mount_arg)
            .privileged(),
        "Mount partition 1",
    )?;
    if !ok {
        return Ok(());
    }

    let file = mount.path().join(TEST_FILE);
    let (ok, _) = rec.assert_command_success(
        env.host,
        &attribute_write(&file, TEST_CONTENT.trim_end()),
        "Create file on mounted filesystem",
    )?;
    if !ok {
        return Ok(());
    }

    let (ok, out) = rec.assert_command_success(
        env.host,
        &attribute_read(&file),
        "Read file from mounted filesystem",
    )?;
    if ok {
        let expected = TEST_CONTENT.trim_end();
        rec.assert_condition(
            format_args!("content of {}", file.display()),
            "File content round trip",
            format_args!("contains {expected:?}"),
            format_args!("{:?}", out.stdout),
            out.stdout.contains(expected),
        );
    }

    rec.assert_command_success(
        env.host,
        &CommandSpec::new("ls")
            .arg("-la")
            .arg(format!("{mount_arg}/"))
            .privileged(),
        "List directory contents",
    )?;

    rec.assert_command_success(env.host, &unmount(mount.path()), "Unmount partition")?;
    Ok(())
}
