//! Test-only helpers for constructing throwaway git repositories.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

/// A local git repository seeded with one tracked file on `main`.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new().context("create tempdir")?;
        run_git(dir.path(), &["init"])?;
        run_git(dir.path(), &["checkout", "-b", "main"])?;
        run_git(dir.path(), &["config", "user.name", "Test"])?;
        run_git(dir.path(), &["config", "user.email", "test@example.com"])?;
        fs::write(dir.path().join("tracked.txt"), "initial\n").context("seed file")?;
        run_git(dir.path(), &["add", "-A"])?;
        run_git(dir.path(), &["commit", "-m", "initial"])?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Add a file (creating parent directories) and commit it.
    pub fn commit_file(&self, rel: &str, contents: &str, message: &str) -> Result<()> {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create parent dirs")?;
        }
        fs::write(&path, contents).with_context(|| format!("write {rel}"))?;
        run_git(self.root(), &["add", "-A"])?;
        run_git(self.root(), &["commit", "-m", message])?;
        Ok(())
    }
}

/// A bare repository usable as a clone/push target, seeded from a `TestRepo`.
///
/// Jobs under test clone from `url()` exactly like they would from a hosted
/// remote, so branch tracking, push, and no-op detection run for real.
pub struct TestRemote {
    dir: TempDir,
}

impl TestRemote {
    /// Create a bare remote holding the current state of `seed`.
    pub fn from_repo(seed: &TestRepo) -> Result<Self> {
        let dir = TempDir::new().context("create remote tempdir")?;
        run_git(dir.path(), &["init", "--bare"])?;
        let url = dir.path().display().to_string();
        run_git(seed.root(), &["remote", "add", "origin", &url])?;
        run_git(seed.root(), &["push", "origin", "main"])?;
        Ok(Self { dir })
    }

    /// Clone URL (a filesystem path; git treats it as a local remote).
    pub fn url(&self) -> String {
        self.dir.path().display().to_string()
    }

    /// Branch heads currently present on the remote.
    pub fn branches(&self) -> Result<Vec<String>> {
        let out = Command::new("git")
            .args(["branch", "--format=%(refname:short)"])
            .current_dir(self.dir.path())
            .output()
            .context("list remote branches")?;
        Ok(String::from_utf8_lossy(&out.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Run a git command in `dir`, failing on non-zero exit.
pub fn run_git(dir: &Path, args: &[&str]) -> Result<PathBuf> {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !out.status.success() {
        return Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr).trim()
        ));
    }
    Ok(dir.to_path_buf())
}
