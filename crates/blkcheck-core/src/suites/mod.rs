//! Conformance suites, in run order.
//!
//! Each suite loads the module itself and leaves the machine as it found it:
//! the module session and any mount are RAII guards, so early returns and `?`
//! still unload and unmount.

use crate::assertions::Recorder;
use crate::env::HarnessEnv;
use anyhow::Result;

pub mod attributes;
pub mod errors;
pub mod filesystem;
pub mod geometry;
pub mod ioctl;
pub mod lifecycle;
pub mod partitions;
pub mod raw_io;

pub type SuiteFn = fn(&HarnessEnv<'_>, &mut Recorder) -> Result<()>;

pub struct Suite {
    pub name: &'static str,
    pub title: &'static str,
    pub run: SuiteFn,
}

pub const SUITES: &[Suite] = &[
    Suite {
        name: "lifecycle",
        title: "Module Lifecycle Tests",
        run: lifecycle::run,
    },
    Suite {
        name: "attributes",
        title: "/proc and /sys Filesystem Tests",
        run: attributes::run,
    },
    Suite {
        name: "geometry",
        title: "Block Device Creation Tests",
        run: geometry::run,
    },
    Suite {
        name: "ioctl",
        title: "IOCTL Commands Tests",
        run: ioctl::run,
    },
    Suite {
        name: "raw_io",
        title: "Read/Write Operations Tests",
        run: raw_io::run,
    },
    Suite {
        name: "partitions",
        title: "Partition Operations Tests",
        run: partitions::run,
    },
    Suite {
        name: "filesystem",
        title: "Filesystem Operations Tests",
        run: filesystem::run,
    },
    Suite {
        name: "errors",
        title: "Error Conditions Tests",
        run: errors::run,
    },
];
