//! In-memory model of the machine under test: a block driver that can be
//! conformant or broken in specific ways, plus just enough of dmesg, dd,
//! blockdev, fdisk and mount to drive the suites.
#![allow(dead_code)]

use blkcheck_core::ioctl::{Geometry, IoctlError};
use blkcheck_core::topology::{DeviceTopology, MIB, PARTITION_COUNT};
use blkcheck_core::{CommandOutput, CommandSpec, ExecError, Host};
use nix::errno::Errno;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DriverBehavior {
    pub load_fails: bool,
    pub announces_init: bool,
    pub partitions: usize,
    /// Size reported for the whole device; `None` means the correct size.
    pub reported_total: Option<u64>,
    /// Size reported for one partition (1-based index), the rest correct.
    pub reported_partition: Option<(usize, u64)>,
    /// Logs a partition truncation warning on load.
    pub logs_truncation: bool,
    /// dmesg refuses to read the buffer, as with `kernel.dmesg_restrict=1`.
    pub dmesg_restricted: bool,
    pub geometry_supported: bool,
    /// Flips the first byte of every device read.
    pub corrupts_reads: bool,
    /// Accepts writes past the end instead of failing.
    pub accepts_overflow: bool,
    /// Utilities reported as not installed.
    pub missing_tools: Vec<&'static str>,
}

impl Default for DriverBehavior {
    fn default() -> Self {
        Self {
            load_fails: false,
            announces_init: true,
            partitions: PARTITION_COUNT,
            reported_total: None,
            reported_partition: None,
            logs_truncation: false,
            dmesg_restricted: false,
            geometry_supported: true,
            corrupts_reads: false,
            accepts_overflow: false,
            missing_tools: Vec::new(),
        }
    }
}

#[derive(Default)]
struct State {
    loaded: bool,
    log: Vec<String>,
    devices: HashMap<PathBuf, BTreeMap<u64, u8>>,
    files: HashMap<PathBuf, Vec<u8>>,
    formatted: BTreeSet<PathBuf>,
    mounted: BTreeMap<PathBuf, PathBuf>,
}

pub struct SimHost {
    pub topology: DeviceTopology,
    pub behavior: DriverBehavior,
    pub sys_module_dir: PathBuf,
    state: RefCell<State>,
    commands: RefCell<Vec<String>>,
    sleeps: Cell<u64>,
}

impl SimHost {
    pub fn new(topology: DeviceTopology, behavior: DriverBehavior) -> Self {
        let sys_module_dir = Path::new("/sys/module").join(&topology.name);
        Self {
            topology,
            behavior,
            sys_module_dir,
            state: RefCell::new(State::default()),
            commands: RefCell::new(Vec::new()),
            sleeps: Cell::new(0),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.borrow().loaded
    }

    pub fn mounted(&self) -> usize {
        self.state.borrow().mounted.len()
    }

    pub fn preload(&self) {
        self.state.borrow_mut().loaded = true;
    }

    fn name(&self) -> &str {
        &self.topology.name
    }

    fn total_size(&self) -> u64 {
        self.behavior
            .reported_total
            .unwrap_or(self.topology.total_size)
    }

    fn visible_partitions(&self) -> &[PathBuf] {
        let n = self.behavior.partitions.min(self.topology.partitions.len());
        &self.topology.partitions[..n]
    }

    fn device_size(&self, path: &Path) -> Option<u64> {
        if !self.state.borrow().loaded {
            return None;
        }
        if path == self.topology.device {
            return Some(self.total_size());
        }
        let index = self.visible_partitions().iter().position(|p| p == path)? + 1;
        match self.behavior.reported_partition {
            Some((i, size)) if i == index => Some(size),
            _ => Some(self.topology.partition_size),
        }
    }

    fn log(&self, line: String) {
        self.state.borrow_mut().log.push(line);
    }

    fn dd(&self, spec: &CommandSpec) -> CommandOutput {
        let bs = spec.operand("bs").map(parse_size).unwrap_or(512);
        let count = spec.operand("count").map(parse_size).unwrap_or(1);
        let skip = spec.operand("skip").map(parse_size).unwrap_or(0) * bs;
        let seek = spec.operand("seek").map(parse_size).unwrap_or(0) * bs;
        let input = Path::new(spec.operand("if").unwrap_or("/dev/stdin"));
        let output = Path::new(spec.operand("of").unwrap_or("/dev/stdout"));
        let len = bs * count;

        // Zero source: never materialized.
        let data: Option<Vec<u8>> = if input == Path::new("/dev/zero") {
            None
        } else if input.starts_with("/dev") {
            let Some(size) = self.device_size(input) else {
                return fail(format!("dd: failed to open '{}': No such file or directory", input.display()));
            };
            let start = skip.min(size);
            let end = (skip + len).min(size);
            let state = self.state.borrow();
            let store = state.devices.get(input);
            let mut bytes: Vec<u8> = (start..end)
                .map(|off| store.and_then(|s| s.get(&off)).copied().unwrap_or(0))
                .collect();
            if self.behavior.corrupts_reads {
                if let Some(b) = bytes.first_mut() {
                    *b ^= 0xff;
                }
            }
            Some(bytes)
        } else {
            match std::fs::read(input) {
                Ok(mut d) => {
                    d.truncate(len as usize);
                    Some(d)
                }
                Err(e) => return fail(format!("dd: {}: {e}", input.display())),
            }
        };

        if output == Path::new("/dev/null") {
            return ok("");
        }
        if output.starts_with("/dev") {
            let Some(size) = self.device_size(output) else {
                return fail(format!("dd: failed to open '{}': No such file or directory", output.display()));
            };
            let want = data.as_ref().map_or(len, |d| d.len() as u64);
            let limit = if self.behavior.accepts_overflow { u64::MAX } else { size };
            let end = (seek + want).min(limit);
            let mut state = self.state.borrow_mut();
            let store = state.devices.entry(output.to_path_buf()).or_default();
            match &data {
                None => {
                    let keys: Vec<u64> = store.range(seek..end).map(|(k, _)| *k).collect();
                    for k in keys {
                        store.remove(&k);
                    }
                }
                Some(bytes) => {
                    for (i, b) in bytes.iter().take((end.saturating_sub(seek)) as usize).enumerate() {
                        store.insert(seek + i as u64, *b);
                    }
                }
            }
            if seek + want > limit {
                return fail(format!("dd: error writing '{}': No space left on device", output.display()));
            }
            return ok("");
        }
        match std::fs::write(output, data.unwrap_or_default()) {
            Ok(()) => ok(""),
            Err(e) => fail(format!("dd: {}: {e}", output.display())),
        }
    }

    fn is_proc(&self, path: &Path) -> bool {
        path == self.topology.proc_attr
    }

    fn is_sysfs(&self, path: &Path) -> bool {
        path == self.topology.sysfs_attr
    }

    fn in_mount(&self, path: &Path) -> bool {
        let state = self.state.borrow();
        path.parent()
            .is_some_and(|dir| state.mounted.values().any(|m| m == dir))
    }
}

fn parse_size(s: &str) -> u64 {
    match s.strip_suffix('M') {
        Some(n) => n.parse::<u64>().unwrap_or(0) * MIB,
        None => s.parse().unwrap_or(0),
    }
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput::new(stdout, "", 0)
}

fn fail(stderr: impl Into<String>) -> CommandOutput {
    CommandOutput::new("", stderr, 1)
}

impl Host for SimHost {
    fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        self.commands.borrow_mut().push(spec.to_string());
        if self.behavior.missing_tools.contains(&spec.program.as_str()) {
            return Err(ExecError::Spawn {
                program: spec.program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "not installed"),
            });
        }
        let arg = |i: usize| spec.args.get(i).map(String::as_str).unwrap_or("");
        let name = self.name().to_string();
        let out = match spec.program.as_str() {
            "modprobe" | "insmod" => {
                if self.behavior.load_fails {
                    fail(format!("{}: ERROR: could not insert '{name}': Invalid argument", spec.program))
                } else {
                    self.state.borrow_mut().loaded = true;
                    if self.behavior.announces_init {
                        self.log(format!("[ 1.000] {name}: [INIT] module loaded"));
                    }
                    if self.behavior.logs_truncation {
                        self.log(format!("[ 1.001] {name}: partition 3 truncated to fit device"));
                    }
                    ok("")
                }
            }
            "rmmod" => {
                if self.state.borrow().loaded {
                    self.state.borrow_mut().loaded = false;
                    self.log(format!("[ 2.000] {name}: [EXIT] module unloaded"));
                    ok("")
                } else {
                    fail(format!("rmmod: ERROR: Module {name} is not currently loaded"))
                }
            }
            "dmesg" => {
                if spec.args.iter().any(|a| a == "-C") {
                    self.state.borrow_mut().log.clear();
                    ok("")
                } else if self.behavior.dmesg_restricted {
                    fail("dmesg: read kernel buffer failed: Operation not permitted")
                } else {
                    ok(self.state.borrow().log.join("\n"))
                }
            }
            "cat" => {
                let path = Path::new(arg(0));
                let loaded = self.state.borrow().loaded;
                if loaded && (self.is_proc(path) || self.is_sysfs(path)) {
                    ok(format!("Capacity: {} bytes", self.total_size()))
                } else if let Some(data) = self.state.borrow().files.get(path) {
                    ok(String::from_utf8_lossy(data).into_owned())
                } else {
                    fail(format!("cat: {}: No such file or directory", path.display()))
                }
            }
            "tee" => {
                let path = Path::new(arg(0));
                let input = spec.stdin.clone().unwrap_or_default();
                let loaded = self.state.borrow().loaded;
                if loaded && self.is_proc(path) {
                    self.log(format!("[ 1.500] {name}: Written to proc file"));
                    ok(String::from_utf8_lossy(&input).into_owned())
                } else if loaded && self.is_sysfs(path) {
                    self.log(format!("[ 1.500] {name}: Written to sysfs file"));
                    ok(String::from_utf8_lossy(&input).into_owned())
                } else if self.in_mount(path) {
                    self.state
                        .borrow_mut()
                        .files
                        .insert(path.to_path_buf(), input.clone());
                    ok(String::from_utf8_lossy(&input).into_owned())
                } else {
                    fail(format!("tee: {}: No such file or directory", path.display()))
                }
            }
            "fdisk" => {
                let dev = Path::new(arg(1));
                match self.device_size(dev) {
                    Some(size) => {
                        let mut listing = format!(
                            "Disk {}: 300 MiB, {size} bytes, {} sectors\nDevice Boot Start End Sectors Size Id Type",
                            dev.display(),
                            size / 512
                        );
                        for p in self.visible_partitions() {
                            listing.push_str(&format!("\n{} 1 204800 204800 100M 83 Linux", p.display()));
                        }
                        ok(listing)
                    }
                    None => fail(format!("fdisk: cannot open {}: No such file or directory", dev.display())),
                }
            }
            "blockdev" => match self.device_size(Path::new(arg(1))) {
                Some(size) => ok(size.to_string()),
                None => fail(format!("blockdev: cannot open {}", arg(1))),
            },
            "dd" => self.dd(spec),
            "mkdir" | "rm" => ok(""),
            "mkfs.ext4" => {
                let dev = Path::new(arg(1));
                if self.device_size(dev).is_some() {
                    self.state.borrow_mut().formatted.insert(dev.to_path_buf());
                    ok("Writing superblocks and filesystem accounting information: done")
                } else {
                    fail("mke2fs: No such file or directory while trying to determine filesystem size")
                }
            }
            "mount" => {
                let dev = PathBuf::from(arg(0));
                let target = PathBuf::from(arg(1));
                let ready = self.device_size(&dev).is_some()
                    && self.state.borrow().formatted.contains(&dev);
                if ready {
                    self.state.borrow_mut().mounted.insert(dev, target);
                    ok("")
                } else {
                    CommandOutput::new("", "mount: wrong fs type, bad option, bad superblock", 32)
                }
            }
            "umount" => {
                let target = PathBuf::from(arg(0));
                let mut state = self.state.borrow_mut();
                let key = state
                    .mounted
                    .iter()
                    .find(|(dev, mnt)| **dev == target || **mnt == target)
                    .map(|(dev, _)| dev.clone());
                match key {
                    Some(dev) => {
                        state.mounted.remove(&dev);
                        ok("")
                    }
                    None => CommandOutput::new("", format!("umount: {}: not mounted.", target.display()), 32),
                }
            }
            "ls" => {
                let dir = PathBuf::from(arg(1).trim_end_matches('/'));
                if self.state.borrow().mounted.values().any(|m| *m == dir) {
                    ok("total 24\ndrwx------ 2 root root 16384 lost+found\n-rw-r--r-- 1 root root 41 test_file.txt")
                } else {
                    fail("ls: cannot access: No such file or directory")
                }
            }
            other => {
                return Err(ExecError::Spawn {
                    program: other.to_string(),
                    source: io::Error::new(io::ErrorKind::NotFound, "unknown to simulator"),
                })
            }
        };
        Ok(out)
    }

    fn path_exists(&self, path: &Path) -> bool {
        let loaded = self.state.borrow().loaded;
        if !loaded {
            return false;
        }
        path == self.sys_module_dir
            || path == self.topology.proc_attr
            || path == self.topology.sysfs_attr
            || self.device_size(path).is_some()
    }

    fn block_size(&self, device: &Path) -> Result<u64, IoctlError> {
        self.device_size(device).ok_or_else(|| IoctlError::DeviceAbsent {
            path: device.display().to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        })
    }

    fn sector_count(&self, device: &Path) -> Result<u64, IoctlError> {
        Ok(self.block_size(device)? / 512)
    }

    fn geometry(&self, device: &Path) -> Result<Geometry, IoctlError> {
        let size = self.block_size(device)?;
        if !self.behavior.geometry_supported {
            return Err(IoctlError::Unsupported(Errno::ENOTTY));
        }
        Ok(Geometry {
            heads: 4,
            sectors: 16,
            cylinders: (size / 512 / 64) as u16,
            start: 0,
        })
    }

    fn sleep(&self, _duration: Duration) {
        self.sleeps.set(self.sleeps.get() + 1);
    }
}

/// Report sink whose contents the test can read back.
#[derive(Clone, Default)]
pub struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
