//! Process exit codes. Scripts and CI key off these.

pub const SUCCESS: i32 = 0;
pub const TESTS_FAILED: i32 = 1; // At least one check failed
pub const MODULE_NOT_FOUND: i32 = 1; // Pre-flight could not locate the .ko
pub const INTERNAL_ERROR: i32 = 2; // Harness setup or report output failed
