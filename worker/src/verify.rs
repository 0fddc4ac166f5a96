//! Verification runner: install + test for each expected sub-project.
//!
//! Failures are values, not panics: a [`TestFailure`] carries the package,
//! failing step, and a bounded stderr tail so the attempt loop can feed it
//! back into the next agent prompt without any stack unwinding.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::io::process::{run_command_with_timeout, tail};

/// Sub-projects verified in order: summary key and repository-relative path.
pub const SUB_PROJECTS: [(&str, &str); 2] = [
    ("ui_deployment", "source/ui-deployment"),
    ("ui_portal", "source/ui-portal"),
];

const INSTALL_TIMEOUT: Duration = Duration::from_secs(20 * 60);
const TEST_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const STDERR_TAIL_CHARS: usize = 4_000;
const OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// One sub-project's verification detail on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFailure {
    pub package: String,
    pub step: String,
    pub stderr: String,
}

impl std::fmt::Display for TestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} failed", self.package, self.step)
    }
}

/// Per-package result recorded in the terminal payload.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PackageResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

pub type TestSummary = BTreeMap<String, PackageResult>;

/// Result of one verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Passed(TestSummary),
    /// Fail-fast: the summary covers packages up to and including the failed
    /// one; remaining packages were not attempted.
    Failed {
        summary: TestSummary,
        failure: TestFailure,
    },
}

/// Abstraction over the verification backend (scripted in tests).
pub trait Verifier {
    fn verify(&self, repo_dir: &Path) -> Result<VerifyOutcome>;
}

/// Runs `npm ci` then `npm test` per sub-project as separate subprocesses.
pub struct NpmVerifier {
    install_cmd: Vec<String>,
    test_cmd: Vec<String>,
}

impl Default for NpmVerifier {
    fn default() -> Self {
        Self {
            install_cmd: ["npm", "ci", "--no-audit", "--no-fund"]
                .map(str::to_string)
                .to_vec(),
            test_cmd: ["npm", "test"].map(str::to_string).to_vec(),
        }
    }
}

impl NpmVerifier {
    /// Override the install/test commands (used by tests to avoid npm).
    pub fn with_commands(install_cmd: Vec<String>, test_cmd: Vec<String>) -> Self {
        Self {
            install_cmd,
            test_cmd,
        }
    }

    fn run_step(
        &self,
        workdir: &Path,
        cmd: &[String],
        timeout: Duration,
    ) -> Result<(bool, String)> {
        let mut command = Command::new(&cmd[0]);
        command.args(&cmd[1..]).current_dir(workdir);
        let out = run_command_with_timeout(command, timeout, OUTPUT_LIMIT_BYTES, &[])?;
        Ok((out.success(), tail(&out.stderr, STDERR_TAIL_CHARS).to_string()))
    }
}

impl Verifier for NpmVerifier {
    #[instrument(skip_all)]
    fn verify(&self, repo_dir: &Path) -> Result<VerifyOutcome> {
        let mut summary = TestSummary::new();

        for (key, rel) in SUB_PROJECTS {
            let workdir = repo_dir.join(rel);
            if !workdir.is_dir() {
                return Err(anyhow!("missing expected directory: {rel}"));
            }

            for (step, cmd, timeout) in [
                ("install", &self.install_cmd, INSTALL_TIMEOUT),
                ("test", &self.test_cmd, TEST_TIMEOUT),
            ] {
                info!(package = rel, step, "verification step start");
                let (ok, stderr) = self.run_step(&workdir, cmd, timeout)?;
                if !ok {
                    warn!(package = rel, step, "verification step failed");
                    summary.insert(
                        key.to_string(),
                        PackageResult {
                            ok: false,
                            step: Some(step.to_string()),
                            stderr: Some(stderr.clone()),
                        },
                    );
                    return Ok(VerifyOutcome::Failed {
                        summary,
                        failure: TestFailure {
                            package: rel.to_string(),
                            step: step.to_string(),
                            stderr,
                        },
                    });
                }
                info!(package = rel, step, "verification step ok");
            }

            summary.insert(
                key.to_string(),
                PackageResult {
                    ok: true,
                    step: None,
                    stderr: None,
                },
            );
        }

        Ok(VerifyOutcome::Passed(summary))
    }
}
