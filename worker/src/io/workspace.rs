//! Ephemeral workspace lifecycle: clone, branch setup, guaranteed removal.
//!
//! A [`Workspace`] owns the temporary directory holding the clone. Dropping it
//! removes the directory, so the cleanup guarantee holds on every exit path:
//! success, handled failure, or panic unwinding.

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{info, instrument};

use crate::io::git::Git;

/// Inputs for preparing a workspace clone.
#[derive(Debug, Clone)]
pub struct CloneRequest {
    /// Remote URL, possibly carrying an embedded credential.
    pub remote_url: String,
    pub base_branch: String,
    /// Target branch: checked out as tracking if it exists on the remote,
    /// freshly branched from the base checkout otherwise.
    pub branch: String,
    /// Tempdir prefix, scoped per run for operator-visible directory names.
    pub run_id: String,
    /// Secrets to scrub from all captured git output.
    pub redact: Vec<String>,
}

/// A single ephemeral clone, exclusively owned by one running job.
pub struct Workspace {
    // Field order matters: `git` holds only a path, `dir` removes it on drop.
    git: Git,
    dir: TempDir,
}

impl Workspace {
    /// Clone the base branch and put the target branch in place.
    ///
    /// Any git failure here is fatal for the job; nothing downstream can run
    /// without a working clone.
    #[instrument(skip_all, fields(branch = %request.branch, base = %request.base_branch))]
    pub fn clone_and_checkout(request: &CloneRequest) -> Result<Self> {
        let dir = TempDir::with_prefix(format!("agent-{}-", request.run_id))
            .context("create workspace dir")?;
        let repo_dir = dir.path().join("repo");

        let git = Git::clone_branch(
            &request.remote_url,
            &request.base_branch,
            &repo_dir,
            &request.redact,
        )?;
        git.set_identity("Repo Agent", "repo-agent@local")?;
        git.set_remote_url(&request.remote_url)?;

        if git.remote_branch_exists(&request.branch)? {
            info!(branch = %request.branch, "target branch exists on remote");
            git.checkout_tracking(&request.branch)?;
        } else {
            info!(branch = %request.branch, "creating target branch from base");
            git.checkout_new_branch(&request.branch)?;
        }

        Ok(Self { git, dir })
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    pub fn root(&self) -> &std::path::Path {
        self.git.workdir()
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("root", &self.dir.path())
            .finish()
    }
}
