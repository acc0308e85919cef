use crate::assertions::Recorder;
use crate::env::HarnessEnv;
use crate::ioctl::IoctlError;
use crate::topology::SECTOR_SIZE;
use anyhow::Result;

pub fn run(env: &HarnessEnv<'_>, rec: &mut Recorder) -> Result<()> {
    let topo = env.topology;
    let _session = env.module.session()?;

    let expected = format!("{} bytes", topo.total_size);
    match env.host.block_size(&topo.device) {
        Ok(size) => {
            rec.assert_condition(
                "BLKGETSIZE64 ioctl",
                "Device size via ioctl",
                &expected,
                format_args!("{size} bytes"),
                size == topo.total_size,
            );
        }
        Err(e) => {
            rec.assert_condition(
                "BLKGETSIZE64 ioctl",
                "Device size via ioctl",
                &expected,
                format_args!("error: {e}"),
                false,
            );
        }
    }

    // BLKGETSIZE counts 512-byte sectors regardless of the logical block size.
    let expected = format!("{} sectors", topo.total_sectors());
    match env.host.sector_count(&topo.device) {
        Ok(sectors) => {
            rec.assert_condition(
                "BLKGETSIZE ioctl",
                "Sector count via ioctl",
                &expected,
                format_args!("{sectors} sectors"),
                sectors * SECTOR_SIZE == topo.total_size,
            );
        }
        Err(e) => {
            rec.assert_condition(
                "BLKGETSIZE ioctl",
                "Sector count via ioctl",
                &expected,
                format_args!("error: {e}"),
                false,
            );
        }
    }

    match env.host.geometry(&topo.device) {
        Ok(geo) => {
            rec.assert_condition(
                "HDIO_GETGEO ioctl",
                "Disk geometry",
                "heads > 0, sectors > 0, cylinders > 0",
                format_args!(
                    "Heads: {}, Sectors: {}, Cylinders: {}",
                    geo.heads, geo.sectors, geo.cylinders
                ),
                geo.is_plausible(),
            );
        }
        Err(e @ IoctlError::Unsupported(_)) => {
            rec.record_optional("HDIO_GETGEO ioctl", "Disk geometry", e);
        }
        Err(e) => {
            rec.assert_condition(
                "HDIO_GETGEO ioctl",
                "Disk geometry",
                "geometry or not-supported",
                format_args!("error: {e}"),
                false,
            );
        }
    }
    Ok(())
}
