//! Side-effecting operations (subprocesses, git, HTTP, workspace lifecycle).
//! Isolated behind small adapters so orchestration can be tested with fakes.

pub mod agent;
pub mod callback;
pub mod context;
pub mod git;
pub mod github;
pub mod process;
pub mod prompt;
pub mod workspace;
