use super::raw_io::round_trip;
use crate::assertions::Recorder;
use crate::env::HarnessEnv;
use crate::payload;
use anyhow::Result;

pub fn run(env: &HarnessEnv<'_>, rec: &mut Recorder) -> Result<()> {
    let _session = env.module.session()?;
    for (i, part) in env.topology.partitions.iter().enumerate() {
        let index = i + 1;
        round_trip(
            env,
            rec,
            part,
            0,
            &payload::partition(index),
            &format!("partition {index}"),
        )?;
    }
    Ok(())
}
