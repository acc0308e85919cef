//! Typed external command execution.
//!
//! Every OS utility the harness drives (modprobe, dd, mount, ...) is described
//! by a [`CommandSpec`] and run without a shell, so arguments never need
//! quoting and a fake executor can match on program and argument list.

use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

/// How privileged commands are issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Privilege {
    /// Prefix privileged commands with `sudo`.
    #[default]
    Sudo,
    /// Run everything as-is (the harness itself is already root).
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub privileged: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            privileged: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Value of a `key=value` style argument (dd operands).
    pub fn operand(&self, key: &str) -> Option<&str> {
        self.args.iter().find_map(|a| {
            a.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }

    /// Program and argv as actually spawned under `privilege`.
    pub fn argv(&self, privilege: Privilege) -> (String, Vec<String>) {
        if self.privileged && privilege == Privilege::Sudo {
            let mut args = Vec::with_capacity(self.args.len() + 1);
            args.push(self.program.clone());
            args.extend(self.args.iter().cloned());
            ("sudo".to_string(), args)
        } else {
            (self.program.clone(), self.args.clone())
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for a in &self.args {
            if a.is_empty() || a.contains(char::is_whitespace) {
                write!(f, " '{}'", a)?;
            } else {
                write!(f, " {}", a)?;
            }
        }
        if let Some(input) = &self.stdin {
            write!(f, " <<< {:?}", String::from_utf8_lossy(input).trim_end())?;
        }
        Ok(())
    }
}

/// Captured result of one command. Output is trimmed of trailing whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit status; `-1` when the process was killed by a signal.
    pub code: i32,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, code: i32) -> Self {
        Self {
            stdout: stdout.into().trim_end().to_string(),
            stderr: stderr.into().trim_end().to_string(),
            code,
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with status {code}: {stderr}")]
    NonZeroExit {
        command: String,
        code: i32,
        stderr: String,
    },
}

/// Runs a command to completion, blocking the caller.
pub trait CommandExecutor {
    /// Non-zero exit is an ordinary result here; only a spawn failure is an error.
    fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError>;

    /// Like [`execute`](Self::execute) but a non-zero exit is an error too.
    fn execute_checked(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        let out = self.execute(spec)?;
        if out.success() {
            Ok(out)
        } else {
            Err(ExecError::NonZeroExit {
                command: spec.to_string(),
                code: out.code,
                stderr: out.stderr,
            })
        }
    }
}

/// Spawns real processes through `std::process::Command`.
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    privilege: Privilege,
}

impl SystemExecutor {
    pub fn new(privilege: Privilege) -> Self {
        Self { privilege }
    }
}

impl CommandExecutor for SystemExecutor {
    fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        let (program, args) = spec.argv(self.privilege);
        let spawn_err = |source| ExecError::Spawn {
            program: program.clone(),
            source,
        };

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;

        if let Some(input) = &spec.stdin {
            if let Some(mut pipe) = child.stdin.take() {
                // A child that exits without reading stdin closes the pipe; its
                // exit status carries the real outcome.
                if let Err(e) = pipe.write_all(input) {
                    debug!(program = %program, error = %e, "stdin write failed");
                }
            }
        }

        let output = child.wait_with_output().map_err(spawn_err)?;
        let result = CommandOutput::new(
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
            output.status.code().unwrap_or(-1),
        );
        debug!(command = %spec, code = result.code, "command finished");
        Ok(result)
    }
}
