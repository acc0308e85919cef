//! Deterministic round-trip payloads.

use std::fmt::Write;

/// Ten sectors.
pub const PAYLOAD_LEN: usize = 5120;

/// Pads (or cuts) `data` to exactly `len` bytes with trailing zeros.
pub fn zero_padded(mut data: Vec<u8>, len: usize) -> Vec<u8> {
    data.resize(len, 0);
    data
}

/// Pattern written to the whole device just past the boot sector.
pub fn whole_device() -> Vec<u8> {
    let mut text = String::from("TEST_PATTERN_START");
    for i in 0..100 {
        let _ = writeln!(text, "LINE_{i:04}_ABCDEFGHIJKLMNOPQRSTUVWXYZ_END");
    }
    text.push_str("TEST_PATTERN_END");
    zero_padded(text.into_bytes(), PAYLOAD_LEN)
}

/// Pattern written at the start of partition `index` (1-based).
pub fn partition(index: usize) -> Vec<u8> {
    let mut text = format!("PARTITION_{index}_TEST_DATA_START\n");
    for j in 0..50 {
        let _ = writeln!(
            text,
            "Partition {index}, Line {j:03}: ABCDEFGHIJKLMNOPQRSTUVWXYZ_0123456789"
        );
    }
    let _ = writeln!(text, "PARTITION_{index}_TEST_DATA_END");
    zero_padded(text.into_bytes(), PAYLOAD_LEN)
}
