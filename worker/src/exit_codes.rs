//! Stable exit codes for the worker process.

/// Terminal non-exceptional outcome: no-op, PR created, or PR reused.
pub const OK: i32 = 0;
/// Unhandled error: invalid job/credential, git or API failure, exhausted
/// fix attempts.
pub const FAILED: i32 = 1;
