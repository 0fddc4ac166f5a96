//! Git adapter for the worker.
//!
//! All repository mutations go through `git` subprocess calls so the worker's
//! safety checks (guardrails, no-op detection) observe exactly what git will
//! commit. Commands that may carry the credential in a remote URL redact it
//! from captured output before anything is logged or returned.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::process::{CommandOutput, run_command_with_timeout};

const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(60);
const NETWORK_GIT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// Wrapper for executing git commands in a working directory.
///
/// `redact` holds secrets (the access token) scrubbed from every captured
/// stdout/stderr.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    redact: Vec<String>,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            redact: Vec::new(),
        }
    }

    pub fn with_redactions(workdir: impl Into<PathBuf>, redact: Vec<String>) -> Self {
        Self {
            workdir: workdir.into(),
            redact,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Clone a single branch of `remote_url` into `dest` (no tags, never
    /// prompting for credentials).
    #[instrument(skip_all, fields(branch))]
    pub fn clone_branch(remote_url: &str, branch: &str, dest: &Path, redact: &[String]) -> Result<Git> {
        info!(branch, dest = %dest.display(), "cloning base branch");
        let mut cmd = Command::new("git");
        cmd.args(["clone", "--no-tags", "--branch", branch, remote_url])
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0");
        let refs: Vec<&str> = redact.iter().map(String::as_str).collect();
        let out = run_command_with_timeout(cmd, NETWORK_GIT_TIMEOUT, OUTPUT_LIMIT_BYTES, &refs)?;
        if !out.success() {
            return Err(anyhow!("git clone failed: {}", out.stderr.trim()));
        }
        Ok(Git::with_redactions(dest, redact.to_vec()))
    }

    /// Configure the synthetic commit identity used for worker commits.
    pub fn set_identity(&self, name: &str, email: &str) -> Result<()> {
        self.run_checked(&["config", "user.name", name], DEFAULT_GIT_TIMEOUT)?;
        self.run_checked(&["config", "user.email", email], DEFAULT_GIT_TIMEOUT)?;
        Ok(())
    }

    /// Point `origin` at an authenticated URL. The URL itself is never logged.
    pub fn set_remote_url(&self, remote_url: &str) -> Result<()> {
        self.run_checked(&["remote", "set-url", "origin", remote_url], DEFAULT_GIT_TIMEOUT)?;
        Ok(())
    }

    /// Check whether `branch` exists on the remote.
    #[instrument(skip_all, fields(branch))]
    pub fn remote_branch_exists(&self, branch: &str) -> Result<bool> {
        let out = self.run_checked(
            &["ls-remote", "--heads", "origin", branch],
            NETWORK_GIT_TIMEOUT,
        )?;
        Ok(!out.stdout.trim().is_empty())
    }

    /// Fetch `branch` and check it out as a local tracking branch.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_tracking(&self, branch: &str) -> Result<()> {
        debug!(branch, "fetching and checking out existing remote branch");
        self.run_checked(&["fetch", "origin", branch], NETWORK_GIT_TIMEOUT)?;
        self.run_checked(
            &["checkout", "-B", branch, &format!("origin/{branch}")],
            DEFAULT_GIT_TIMEOUT,
        )?;
        Ok(())
    }

    /// Create and checkout a new branch at current HEAD.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_new_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "creating and checking out new branch");
        self.run_checked(&["checkout", "-b", branch], DEFAULT_GIT_TIMEOUT)?;
        Ok(())
    }

    /// Worktree status in porcelain v1 form (one line per entry).
    pub fn status_porcelain(&self) -> Result<String> {
        let out = self.run_checked(&["status", "--porcelain=v1"], DEFAULT_GIT_TIMEOUT)?;
        Ok(out.stdout)
    }

    /// True if the worktree holds uncommitted modifications.
    pub fn has_worktree_changes(&self) -> Result<bool> {
        Ok(!self.status_porcelain()?.trim().is_empty())
    }

    /// Paths changed relative to the last commit: worktree and staged
    /// modifications (`diff HEAD`), plus untracked files. Staged entries must
    /// be reported, or an agent could `git add` a disallowed path and commit
    /// it past the guardrail.
    pub fn changed_paths(&self) -> Result<Vec<String>> {
        let diff = self.run_checked(&["diff", "HEAD", "--name-only"], DEFAULT_GIT_TIMEOUT)?;
        let untracked = self.run_checked(
            &["ls-files", "--others", "--exclude-standard"],
            DEFAULT_GIT_TIMEOUT,
        )?;
        let mut paths: Vec<String> = diff
            .stdout
            .lines()
            .chain(untracked.stdout.lines())
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    /// True if the branch head differs from the remote base branch tip.
    ///
    /// Uses `git diff --quiet origin/<base>..HEAD`; exit 1 means a diff
    /// exists, any other non-zero exit is a failure.
    pub fn differs_from_remote_base(&self, base_branch: &str) -> Result<bool> {
        let range = format!("origin/{base_branch}..HEAD");
        let out = self.run(&["diff", "--quiet", &range], DEFAULT_GIT_TIMEOUT)?;
        match out.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(anyhow!(
                "git diff {} failed: {}",
                range,
                out.stderr.trim()
            )),
        }
    }

    /// Tracked files under the given path prefixes.
    pub fn ls_files(&self, prefixes: &[String]) -> Result<Vec<String>> {
        let mut args = vec!["ls-files", "--"];
        args.extend(prefixes.iter().map(String::as_str));
        let out = self.run_checked(&args, DEFAULT_GIT_TIMEOUT)?;
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// `git grep -n` within the given prefixes. Exit 1 (no matches) is Ok.
    pub fn grep(&self, pattern: &str, prefixes: &[String]) -> Result<Vec<String>> {
        let mut args = vec!["grep", "-n", pattern, "--"];
        args.extend(prefixes.iter().map(String::as_str));
        let out = self.run(&args, DEFAULT_GIT_TIMEOUT)?;
        match out.status.code() {
            Some(0) | Some(1) => Ok(out
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()),
            _ => Err(anyhow!("git grep failed: {}", out.stderr.trim())),
        }
    }

    /// Textual diff restricted to the given prefixes.
    pub fn diff_text(&self, prefixes: &[String]) -> Result<String> {
        let mut args = vec!["diff", "--"];
        args.extend(prefixes.iter().map(String::as_str));
        let out = self.run_checked(&args, DEFAULT_GIT_TIMEOUT)?;
        Ok(out.stdout)
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"], DEFAULT_GIT_TIMEOUT)?;
        Ok(())
    }

    /// Commit staged changes. Returns the raw output so callers can surface
    /// "nothing to commit" to the agent instead of failing the loop.
    pub fn commit(&self, message: &str) -> Result<CommandOutput> {
        self.run(&["commit", "-m", message], DEFAULT_GIT_TIMEOUT)
    }

    /// Commit staged changes, failing on non-zero exit.
    pub fn commit_checked(&self, message: &str) -> Result<()> {
        let out = self.commit(message)?;
        if !out.success() {
            return Err(anyhow!("git commit failed: {}", out.stderr.trim()));
        }
        Ok(())
    }

    /// Push the branch to origin, setting upstream.
    #[instrument(skip_all, fields(branch))]
    pub fn push(&self, branch: &str) -> Result<()> {
        info!(branch, "pushing branch");
        let out = self.run(&["push", "-u", "origin", branch], NETWORK_GIT_TIMEOUT)?;
        if !out.success() {
            warn!(exit_code = ?out.status.code(), "git push failed");
            return Err(anyhow!("git push failed: {}", out.stderr.trim()));
        }
        Ok(())
    }

    fn run_checked(&self, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
        let out = self.run(args, timeout)?;
        if !out.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                out.stderr.trim()
            ));
        }
        Ok(out)
    }

    fn run(&self, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0");
        let refs: Vec<&str> = self.redact.iter().map(String::as_str).collect();
        run_command_with_timeout(cmd, timeout, OUTPUT_LIMIT_BYTES, &refs)
            .with_context(|| format!("run git {}", args.join(" ")))
    }
}
