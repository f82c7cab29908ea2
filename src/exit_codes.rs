//! Stable exit codes for the ralphy CLI.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed (pre-flight failure, stage failure, or infrastructure error).
pub const FAILURE: i32 = 1;
/// Run interrupted by SIGINT.
pub const SIGINT: i32 = 130;
/// Run terminated by SIGTERM.
pub const SIGTERM: i32 = 143;
