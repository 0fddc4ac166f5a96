//! Autonomous repository-change worker.
//!
//! Given a job describing a repository, an issue, and a branch, the worker
//! prepares an isolated clone, drives a bounded tool-call loop with an
//! external reasoning agent through a constrained tool surface, verifies the
//! result against the project's test suites, and on success commits, pushes,
//! and opens (or reuses) a pull request. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (job validation, guardrails,
//!   response decoding). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (subprocesses, git, HTTP,
//!   workspace lifecycle). Isolated behind adapters to enable fakes in tests.
//!
//! Orchestration modules ([`agent_loop`], [`verify`], [`run`], [`tools`])
//! coordinate core logic with I/O to implement one job execution.

pub mod agent_loop;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
pub mod verify;
