//! Block-device ioctl probes (BLKGETSIZE64, BLKGETSIZE, HDIO_GETGEO).
//!
//! The device is opened inside this process, so it needs read access to the
//! node (root, in practice).
#![allow(unsafe_code)]

use nix::errno::Errno;
use serde::Serialize;
use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use thiserror::Error;

/// `struct hd_geometry` from `<linux/hdreg.h>`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct HdGeometry {
    heads: u8,
    sectors: u8,
    cylinders: u16,
    start: libc::c_ulong,
}

// BLKGETSIZE64 = _IOR(0x12, 114, size_t)
nix::ioctl_read!(blk_getsize64, 0x12, 114, u64);
// BLKGETSIZE = _IO(0x12, 96), but the kernel writes an unsigned long back
nix::ioctl_read_bad!(blk_getsize, nix::request_code_none!(0x12, 96), libc::c_ulong);
// HDIO_GETGEO predates the _IOR encoding
nix::ioctl_read_bad!(hdio_getgeo, 0x0301, HdGeometry);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Geometry {
    pub heads: u16,
    pub sectors: u16,
    pub cylinders: u16,
    pub start: u64,
}

impl Geometry {
    pub fn is_plausible(&self) -> bool {
        self.heads > 0 && self.sectors > 0 && self.cylinders > 0
    }
}

#[derive(Debug, Error)]
pub enum IoctlError {
    /// The driver does not implement the request.
    #[error("ioctl not supported by device: {0}")]
    Unsupported(Errno),

    /// No such node, or no driver behind it.
    #[error("device {path} unavailable: {source}")]
    DeviceAbsent {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The node exists but this process may not open it.
    #[error("no permission to open {path}: {source}")]
    PermissionDenied {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("ioctl failed: {0}")]
    Os(Errno),
}

impl IoctlError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, IoctlError::Unsupported(_))
    }

    pub fn from_errno(errno: Errno) -> Self {
        match errno {
            Errno::ENOTTY | Errno::EINVAL | Errno::EOPNOTSUPP | Errno::ENOSYS => {
                IoctlError::Unsupported(errno)
            }
            other => IoctlError::Os(other),
        }
    }

    /// Sorts an `open(2)` failure into absent, denied or other.
    pub fn from_open_error(path: &Path, source: io::Error) -> Self {
        let path = path.display().to_string();
        match source.raw_os_error().map(Errno::from_i32) {
            Some(Errno::EACCES | Errno::EPERM) => IoctlError::PermissionDenied { path, source },
            Some(Errno::ENOENT | Errno::ENXIO | Errno::ENODEV) | None => {
                IoctlError::DeviceAbsent { path, source }
            }
            Some(other) => IoctlError::Os(other),
        }
    }
}

fn open_device(path: &Path) -> Result<File, IoctlError> {
    File::open(path).map_err(|source| IoctlError::from_open_error(path, source))
}

/// Total device size in bytes.
pub fn device_size(path: &Path) -> Result<u64, IoctlError> {
    let file = open_device(path)?;
    let mut size: u64 = 0;
    // SAFETY: fd is open for the duration of the call and `size` is a valid u64
    // out-parameter matching the request's declared size.
    unsafe { blk_getsize64(file.as_raw_fd(), &mut size) }.map_err(IoctlError::from_errno)?;
    Ok(size)
}

/// Size in 512-byte sectors, whatever the device's logical block size.
pub fn device_sectors(path: &Path) -> Result<u64, IoctlError> {
    let file = open_device(path)?;
    let mut sectors: libc::c_ulong = 0;
    // SAFETY: fd is open for the duration of the call and `sectors` is the
    // unsigned long the kernel writes.
    unsafe { blk_getsize(file.as_raw_fd(), &mut sectors) }.map_err(IoctlError::from_errno)?;
    Ok(sectors as u64)
}

pub fn device_geometry(path: &Path) -> Result<Geometry, IoctlError> {
    let file = open_device(path)?;
    let mut geo = HdGeometry::default();
    // SAFETY: `geo` has the kernel's hd_geometry layout and outlives the call.
    unsafe { hdio_getgeo(file.as_raw_fd(), &mut geo) }.map_err(IoctlError::from_errno)?;
    Ok(Geometry {
        heads: u16::from(geo.heads),
        sectors: u16::from(geo.sectors),
        cylinders: geo.cylinders,
        start: geo.start as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_classification() {
        assert!(IoctlError::from_errno(Errno::ENOTTY).is_unsupported());
        assert!(IoctlError::from_errno(Errno::EINVAL).is_unsupported());
        assert!(!IoctlError::from_errno(Errno::EIO).is_unsupported());
    }

    #[test]
    fn missing_node_is_device_absent() {
        let err = device_size(Path::new("/dev/blkcheck-does-not-exist")).unwrap_err();
        assert!(matches!(err, IoctlError::DeviceAbsent { .. }));
        let err = device_geometry(Path::new("/dev/blkcheck-does-not-exist")).unwrap_err();
        assert!(!err.is_unsupported());
    }

    #[test]
    fn open_errors_split_absent_from_denied() {
        let dev = Path::new("/dev/ex_blk");
        let denied = IoctlError::from_open_error(dev, io::Error::from_raw_os_error(libc::EACCES));
        assert!(matches!(denied, IoctlError::PermissionDenied { .. }), "got {denied:?}");
        assert!(denied.to_string().contains("no permission to open /dev/ex_blk"));
        let eperm = IoctlError::from_open_error(dev, io::Error::from_raw_os_error(libc::EPERM));
        assert!(matches!(eperm, IoctlError::PermissionDenied { .. }));
        for code in [libc::ENOENT, libc::ENXIO, libc::ENODEV] {
            let err = IoctlError::from_open_error(dev, io::Error::from_raw_os_error(code));
            assert!(matches!(err, IoctlError::DeviceAbsent { .. }), "errno {code}: {err:?}");
        }
        let busy = IoctlError::from_open_error(dev, io::Error::from_raw_os_error(libc::EBUSY));
        assert!(matches!(busy, IoctlError::Os(Errno::EBUSY)));
    }

    #[test]
    fn unreadable_node_is_not_reported_absent() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o000)).unwrap();
        // root bypasses mode bits and reaches the ioctl instead
        match device_size(tmp.path()) {
            Err(IoctlError::PermissionDenied { .. }) | Err(IoctlError::Unsupported(_)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn regular_file_rejects_block_ioctl() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let err = device_size(tmp.path()).unwrap_err();
        assert!(err.is_unsupported(), "got {err:?}");
    }

    #[test]
    fn geometry_plausibility() {
        let g = Geometry {
            heads: 4,
            sectors: 16,
            cylinders: 9600,
            start: 0,
        };
        assert!(g.is_plausible());
        assert!(!Geometry { heads: 0, ..g }.is_plausible());
    }
}
