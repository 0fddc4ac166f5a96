//! Pure, deterministic logic (validation, guardrails, response decoding).
//! No I/O, fully testable in isolation.

pub mod guardrail;
pub mod job;
pub mod response;
pub mod session;
