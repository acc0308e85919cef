use crate::exec::{CommandExecutor, CommandOutput, CommandSpec, ExecError, Privilege, SystemExecutor};
use crate::ioctl::{self, Geometry, IoctlError};
use std::path::Path;
use std::time::Duration;

/// Everything the harness may observe or change on the machine under test.
///
/// Suites never touch the OS directly; swapping the host swaps the machine.
pub trait Host {
    fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError>;

    fn path_exists(&self, path: &Path) -> bool;

    /// BLKGETSIZE64 on `device`.
    fn block_size(&self, device: &Path) -> Result<u64, IoctlError>;

    /// BLKGETSIZE on `device`, in 512-byte sectors.
    fn sector_count(&self, device: &Path) -> Result<u64, IoctlError>;

    /// HDIO_GETGEO on `device`.
    fn geometry(&self, device: &Path) -> Result<Geometry, IoctlError>;

    fn sleep(&self, duration: Duration);
}

/// The machine the harness runs on.
#[derive(Debug, Clone, Default)]
pub struct LinuxHost {
    exec: SystemExecutor,
}

impl LinuxHost {
    pub fn new(privilege: Privilege) -> Self {
        Self {
            exec: SystemExecutor::new(privilege),
        }
    }
}

impl Host for LinuxHost {
    fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        self.exec.execute(spec)
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn block_size(&self, device: &Path) -> Result<u64, IoctlError> {
        ioctl::device_size(device)
    }

    fn sector_count(&self, device: &Path) -> Result<u64, IoctlError> {
        ioctl::device_sectors(device)
    }

    fn geometry(&self, device: &Path) -> Result<Geometry, IoctlError> {
        ioctl::device_geometry(device)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
