//! Read-only (plus ring-buffer clear) views of system state.

use crate::exec::{CommandOutput, CommandSpec, ExecError};
use crate::host::Host;
use std::path::Path;

/// The kernel ring buffer.
pub struct KernelLog<'a> {
    host: &'a dyn Host,
}

impl<'a> KernelLog<'a> {
    pub fn new(host: &'a dyn Host) -> Self {
        Self { host }
    }

    /// Full current buffer text.
    ///
    /// A refused read (e.g. `dmesg_restrict`) is an error carrying dmesg's
    /// stderr, never an empty buffer.
    pub fn read(&self) -> Result<String, ExecError> {
        let spec = CommandSpec::new("dmesg").privileged();
        let out = self.host.execute(&spec)?;
        if !out.success() {
            return Err(ExecError::NonZeroExit {
                command: spec.to_string(),
                code: out.code,
                stderr: out.stderr,
            });
        }
        Ok(out.stdout)
    }

    /// Empties the buffer so later reads only see what follows.
    pub fn clear(&self) -> Result<CommandOutput, ExecError> {
        self.host
            .execute(&CommandSpec::new("dmesg").arg("-C").privileged())
    }
}

/// `cat` of a procfs/sysfs attribute.
pub fn attribute_read(path: &Path) -> CommandSpec {
    CommandSpec::new("cat")
        .arg(path.display().to_string())
        .privileged()
}

/// `tee` of `content` plus a newline into an attribute (or any file).
pub fn attribute_write(path: &Path, content: &str) -> CommandSpec {
    CommandSpec::new("tee")
        .arg(path.display().to_string())
        .stdin(format!("{content}\n"))
        .privileged()
}
