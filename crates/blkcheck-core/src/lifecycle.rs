//! Kernel module load/unload control.
//!
//! The kernel owns the real load state; the controller only issues commands
//! and waits, bounded, for the side effects to become visible.

use crate::exec::{CommandOutput, CommandSpec, ExecError};
use crate::host::Host;
use crate::probes;
use crate::topology::DeviceTopology;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the module binary comes from, which decides the load command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ModuleSource {
    /// Installed under `/lib/modules`; loaded with `modprobe`.
    Installed(PathBuf),
    /// A loose `.ko` file; loaded with `insmod`.
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHandle {
    pub name: String,
    pub source: ModuleSource,
    /// `/sys/module/<name>`; present exactly while the module is loaded.
    pub sysfs_dir: PathBuf,
}

impl ModuleHandle {
    pub fn new(name: &str, source: ModuleSource, sys_module_root: &Path) -> Self {
        Self {
            name: name.to_string(),
            source,
            sysfs_dir: sys_module_root.join(name),
        }
    }

    pub fn parameter_path(&self, param: &str) -> PathBuf {
        self.sysfs_dir.join("parameters").join(param)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    pub load_timeout: Duration,
    pub unload_timeout: Duration,
    pub poll_interval: Duration,
    /// Fixed pause after a parameter write; nothing observable to poll for.
    pub param_delay: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(5),
            unload_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            param_delay: Duration::from_millis(200),
        }
    }
}

/// Polls `cond` until it holds or `timeout` worth of `interval` sleeps elapse.
///
/// Bounded by attempt count rather than wall clock so a host whose `sleep`
/// is a no-op still terminates.
pub fn wait_until(
    host: &dyn Host,
    timeout: Duration,
    interval: Duration,
    mut cond: impl FnMut() -> bool,
) -> bool {
    let interval_ms = interval.as_millis().max(1);
    let attempts = (timeout.as_millis() / interval_ms).max(1);
    for _ in 0..attempts {
        if cond() {
            return true;
        }
        host.sleep(interval);
    }
    cond()
}

pub struct ModuleController<'a> {
    host: &'a dyn Host,
    module: ModuleHandle,
    topology: &'a DeviceTopology,
    settle: SettlePolicy,
}

impl<'a> ModuleController<'a> {
    pub fn new(
        host: &'a dyn Host,
        module: ModuleHandle,
        topology: &'a DeviceTopology,
        settle: SettlePolicy,
    ) -> Self {
        Self {
            host,
            module,
            topology,
            settle,
        }
    }

    fn load_command(&self) -> CommandSpec {
        match &self.module.source {
            ModuleSource::Installed(_) => CommandSpec::new("modprobe").arg(&self.module.name),
            ModuleSource::File(path) => {
                CommandSpec::new("insmod").arg(path.display().to_string())
            }
        }
        .privileged()
    }

    /// Issues the load command, then waits for the device nodes to appear.
    ///
    /// Whether the nodes actually appeared is for the suites to assert.
    pub fn load(&self) -> Result<CommandOutput, ExecError> {
        info!(module = %self.module.name, "loading module");
        let out = self.host.execute(&self.load_command())?;
        if !out.success() {
            warn!(module = %self.module.name, code = out.code, stderr = %out.stderr, "load command failed");
        }

        let host = self.host;
        let topo = self.topology;
        let settled = wait_until(host, self.settle.load_timeout, self.settle.poll_interval, || {
            host.path_exists(&topo.device) && topo.partitions.iter().all(|p| host.path_exists(p))
        });
        if !settled {
            warn!(
                device = %topo.device.display(),
                timeout_ms = self.settle.load_timeout.as_millis() as u64,
                "device nodes did not settle after load"
            );
        }
        Ok(out)
    }

    /// Removes the module. Not being loaded counts as success.
    pub fn unload(&self) -> Result<(), ExecError> {
        info!(module = %self.module.name, "unloading module");
        let out = self
            .host
            .execute(&CommandSpec::new("rmmod").arg(&self.module.name).privileged())?;
        if !out.success() {
            debug!(module = %self.module.name, stderr = %out.stderr, "rmmod refused (not loaded?)");
        }

        let host = self.host;
        let dir = &self.module.sysfs_dir;
        if !wait_until(host, self.settle.unload_timeout, self.settle.poll_interval, || {
            !host.path_exists(dir)
        }) {
            warn!(module = %self.module.name, "module still present after unload");
        }
        Ok(())
    }

    /// Writes `value` into the module's sysfs parameter file.
    ///
    /// A failed write comes back as an ordinary command result.
    pub fn set_parameter(&self, param: &str, value: &str) -> Result<CommandOutput, ExecError> {
        let path = self.module.parameter_path(param);
        let out = self.host.execute(&probes::attribute_write(&path, value))?;
        self.host.sleep(self.settle.param_delay);
        Ok(out)
    }

    /// Loads the module and returns a guard that unloads it when dropped.
    pub fn session(&self) -> Result<ModuleSession<'_, 'a>, ExecError> {
        let load = self.load()?;
        Ok(ModuleSession {
            controller: self,
            load,
            active: true,
        })
    }
}

/// A loaded module; dropping it unloads, whatever happened in between.
pub struct ModuleSession<'c, 'a> {
    controller: &'c ModuleController<'a>,
    load: CommandOutput,
    active: bool,
}

impl ModuleSession<'_, '_> {
    pub fn load_output(&self) -> &CommandOutput {
        &self.load
    }

    /// Unloads now so the caller can inspect the aftermath.
    pub fn unload(mut self) -> Result<(), ExecError> {
        self.active = false;
        self.controller.unload()
    }
}

impl Drop for ModuleSession<'_, '_> {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.controller.unload() {
                warn!(error = %e, "unload during teardown failed");
            }
        }
    }
}
