use crate::exec::CommandSpec;
use crate::host::Host;
use crate::lifecycle::{ModuleController, ModuleHandle, ModuleSource, SettlePolicy};
use crate::probes::KernelLog;
use crate::topology::{DeviceTopology, PathRoots, DEFAULT_DEVICE_NAME};
use anyhow::{Context, Result};
use std::path::Path;
use tempfile::TempDir;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub module_name: String,
    pub module_source: ModuleSource,
    pub device_name: String,
    pub roots: PathRoots,
    pub settle: SettlePolicy,
}

impl HarnessConfig {
    pub fn new(module_name: &str, module_source: ModuleSource) -> Self {
        Self {
            module_name: module_name.to_string(),
            module_source,
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            roots: PathRoots::default(),
            settle: SettlePolicy::default(),
        }
    }

    pub fn with_device_name(mut self, name: &str) -> Self {
        self.device_name = name.to_string();
        self
    }

    pub fn with_roots(mut self, roots: PathRoots) -> Self {
        self.roots = roots;
        self
    }

    pub fn with_settle(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    pub fn topology(&self) -> DeviceTopology {
        DeviceTopology::new(&self.device_name, &self.roots)
    }
}

/// Everything a suite may touch, passed explicitly instead of global paths.
pub struct HarnessEnv<'h> {
    pub host: &'h dyn Host,
    pub topology: &'h DeviceTopology,
    pub module: ModuleController<'h>,
    scratch: TempDir,
}

impl<'h> HarnessEnv<'h> {
    pub fn new(host: &'h dyn Host, topology: &'h DeviceTopology, config: &HarnessConfig) -> Result<Self> {
        let handle = ModuleHandle::new(
            &config.module_name,
            config.module_source.clone(),
            &config.roots.sys_module,
        );
        let scratch = tempfile::Builder::new()
            .prefix("blkcheck-")
            .tempdir()
            .context("creating scratch directory")?;
        Ok(Self {
            host,
            topology,
            module: ModuleController::new(host, handle, topology, config.settle),
            scratch,
        })
    }

    pub fn log(&self) -> KernelLog<'h> {
        KernelLog::new(self.host)
    }

    /// Harness-owned directory for payload and read-back files.
    pub fn scratch(&self) -> &Path {
        self.scratch.path()
    }

    /// Runs a best-effort command whose outcome is not scored.
    pub fn run_quiet(&self, spec: &CommandSpec) -> Result<()> {
        let out = self
            .host
            .execute(spec)
            .with_context(|| format!("running '{spec}'"))?;
        debug!(command = %spec, code = out.code, "best-effort command");
        Ok(())
    }
}
