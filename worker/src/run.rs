//! Top-level job orchestration: workspace, fix attempts, finalization.
//!
//! Stage order per job: prepare the workspace clone, then up to
//! `max_fix_attempts` iterations of (optional agent loop) -> guardrail ->
//! verification, then finalization (no-op detection, commit, push, PR
//! create-or-reuse). Status callbacks fire at start and at every terminal
//! outcome; the workspace is removed on every exit path because the
//! [`Workspace`] owns its temp directory.

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::agent_loop::{LoopConfig, LoopRequest, run_agent_loop};
use crate::core::guardrail;
use crate::core::job::Job;
use crate::io::agent::AgentRuntime;
use crate::io::callback::StatusSink;
use crate::io::github::{IssueHost, NewPullRequest};
use crate::io::workspace::{CloneRequest, Workspace};
use crate::verify::{TestFailure, TestSummary, Verifier, VerifyOutcome};

/// Tuning for one job execution.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Maximum fix attempts; the last attempt's failure escalates as fatal.
    pub max_fix_attempts: u32,
    pub loop_config: LoopConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_fix_attempts: 3,
            loop_config: LoopConfig::default(),
        }
    }
}

/// Injected collaborators for one job execution.
pub struct RunDeps<'a> {
    pub issues: &'a dyn IssueHost,
    /// Reasoning agent; `None` means "verify and finalize only".
    pub agent: Option<&'a dyn AgentRuntime>,
    pub verifier: &'a dyn Verifier,
    pub status: &'a dyn StatusSink,
    /// Clone/push URL, possibly carrying the embedded credential.
    pub remote_url: String,
    /// Secrets scrubbed from all captured subprocess output.
    pub redact: Vec<String>,
}

/// Terminal non-exceptional outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Neither worktree changes nor a branch diff against base: nothing to
    /// submit, no PR opened.
    NoChanges { test_summary: TestSummary },
    /// Changes were pushed and a PR exists (created now or reused).
    PrCreated {
        pr_url: String,
        pr_number: u64,
        test_summary: TestSummary,
    },
}

/// Why one fix attempt did not succeed.
#[derive(Debug, Clone)]
enum AttemptFailure {
    Guardrail(String),
    Tests(TestFailure),
}

impl AttemptFailure {
    fn as_feedback(&self) -> String {
        match self {
            AttemptFailure::Guardrail(msg) => {
                format!("Previous attempt changed files outside the allowed paths:\n{msg}\n")
            }
            AttemptFailure::Tests(failure) => format!(
                "Previous attempt failed tests at {} {}.\nstderr:\n{}\n",
                failure.package, failure.step, failure.stderr
            ),
        }
    }

    fn into_error(self) -> anyhow::Error {
        match self {
            AttemptFailure::Guardrail(msg) => anyhow!(msg),
            AttemptFailure::Tests(failure) => {
                anyhow!("{failure}\nstderr:\n{}", failure.stderr)
            }
        }
    }
}

/// Execute one job end to end, emitting status callbacks on every terminal
/// path. Errors are reported through the failure callback and re-raised.
#[instrument(skip_all, fields(run_id = %job.run_id, repo = %job.repo, branch = %job.branch))]
pub fn run_job(job: &Job, deps: &RunDeps<'_>, config: &RunConfig) -> Result<RunOutcome> {
    deps.status.post(&base_payload(job, "started"));

    match execute(job, deps, config) {
        Ok(outcome) => {
            deps.status.post(&terminal_payload(job, &outcome));
            Ok(outcome)
        }
        Err(err) => {
            let mut payload = base_payload(job, "failed");
            payload["error"] = json!(format!("{err:#}"));
            deps.status.post(&payload);
            Err(err)
        }
    }
}

fn execute(job: &Job, deps: &RunDeps<'_>, config: &RunConfig) -> Result<RunOutcome> {
    info!("fetching issue");
    let issue = deps.issues.get_issue(&job.repo, job.issue_number)?;

    let workspace = Workspace::clone_and_checkout(&CloneRequest {
        remote_url: deps.remote_url.clone(),
        base_branch: job.base_branch.clone(),
        branch: job.branch.clone(),
        run_id: job.run_id.clone(),
        redact: deps.redact.clone(),
    })?;
    let git = workspace.git();

    let mut test_summary = TestSummary::new();
    let mut last_failure: Option<AttemptFailure> = None;

    for attempt in 1..=config.max_fix_attempts {
        if let Some(agent) = deps.agent {
            let feedback = combined_feedback(job.feedback.as_deref(), last_failure.as_ref());
            info!(attempt, "agent tool loop start");
            let loop_outcome = run_agent_loop(
                agent,
                git,
                &LoopRequest {
                    repo: job.repo.clone(),
                    issue_number: job.issue_number,
                    issue_title: issue.title.clone(),
                    issue_body: issue.body.clone(),
                    branch: job.branch.clone(),
                    base_branch: job.base_branch.clone(),
                    allowed_paths: job.allowed_paths.clone(),
                    feedback,
                },
                &config.loop_config,
            )?;
            info!(attempt, outcome = ?loop_outcome, "agent tool loop end");
        }

        info!(attempt, "guardrail check");
        if let Err(err) = guardrail::check_paths(&git.changed_paths()?, &job.allowed_paths) {
            warn!(attempt, err = %err, "guardrail violation");
            last_failure = Some(AttemptFailure::Guardrail(format!("{err:#}")));
            if attempt == config.max_fix_attempts {
                return Err(last_failure
                    .take()
                    .map(AttemptFailure::into_error)
                    .unwrap_or_else(|| anyhow!("guardrail violation")));
            }
            continue;
        }

        info!(attempt, "verification start");
        match deps.verifier.verify(git.workdir())? {
            VerifyOutcome::Passed(summary) => {
                info!(attempt, "verification passed");
                test_summary = summary;
                break;
            }
            VerifyOutcome::Failed { summary, failure } => {
                warn!(attempt, package = %failure.package, step = %failure.step, "verification failed");
                test_summary = summary;
                last_failure = Some(AttemptFailure::Tests(failure));
                if attempt == config.max_fix_attempts {
                    // Surface the last failure's detail, not an earlier one.
                    return Err(last_failure
                        .take()
                        .map(AttemptFailure::into_error)
                        .unwrap_or_else(|| anyhow!("verification failed")));
                }
            }
        }
    }

    finalize(job, deps, &workspace, &issue.title, test_summary)
}

/// Decide between "no changes" and commit + push + PR.
fn finalize(
    job: &Job,
    deps: &RunDeps<'_>,
    workspace: &Workspace,
    issue_title: &str,
    test_summary: TestSummary,
) -> Result<RunOutcome> {
    let git = workspace.git();
    let has_worktree_changes = git.has_worktree_changes()?;
    // HEAD equal to the remote base tip means PR creation would be rejected
    // ("no commits between base and head"), so check both signals.
    let has_commit_diff = git.differs_from_remote_base(&job.base_branch)?;

    if !has_worktree_changes && !has_commit_diff {
        info!("no changes to submit");
        return Ok(RunOutcome::NoChanges { test_summary });
    }

    if has_worktree_changes {
        git.add_all()?;
        guardrail::check_paths(&git.changed_paths()?, &job.allowed_paths)
            .context("pre-commit guardrail")?;
        git.commit_checked(&format!("agent: issue #{}", job.issue_number))?;
    }

    git.push(&job.branch)?;

    let pr = match deps.issues.find_open_pr(&job.repo, &job.branch)? {
        Some(existing) => {
            info!(pr = existing.number, "reusing existing open pull request");
            existing
        }
        None => {
            let created = deps.issues.create_pr(
                &job.repo,
                &NewPullRequest {
                    title: format!("Agent: {issue_title}"),
                    body: format!(
                        "Fixes #{}\n\nAutomated changes by the repository agent worker.",
                        job.issue_number
                    ),
                    head: job.branch.clone(),
                    base: job.base_branch.clone(),
                },
            )?;
            info!(pr = created.number, "created pull request");
            created
        }
    };

    Ok(RunOutcome::PrCreated {
        pr_url: pr.html_url,
        pr_number: pr.number,
        test_summary,
    })
}

fn combined_feedback(job_feedback: Option<&str>, failure: Option<&AttemptFailure>) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(text) = job_feedback.map(str::trim).filter(|t| !t.is_empty()) {
        parts.push(format!(
            "External feedback (e.g., PR review comments):\n{text}"
        ));
    }
    if let Some(failure) = failure {
        parts.push(failure.as_feedback());
    }
    let combined = parts.join("\n\n").trim().to_string();
    (!combined.is_empty()).then_some(combined)
}

fn base_payload(job: &Job, status: &str) -> Value {
    json!({
        "status": status,
        "run_id": job.run_id,
        "repo": job.repo,
        "issue_number": job.issue_number,
        "branch": job.branch,
    })
}

/// Terminal payload: always carries the verification summary.
fn terminal_payload(job: &Job, outcome: &RunOutcome) -> Value {
    match outcome {
        RunOutcome::NoChanges { test_summary } => {
            let mut payload = base_payload(job, "no_changes");
            payload["test_summary"] = json!(test_summary);
            payload
        }
        RunOutcome::PrCreated {
            pr_url,
            pr_number,
            test_summary,
        } => {
            let mut payload = base_payload(job, "pr_created");
            payload["pr_url"] = json!(pr_url);
            payload["pr_number"] = json!(pr_number);
            payload["test_summary"] = json!(test_summary);
            payload
        }
    }
}

/// Terminal payload for main's final log line.
pub fn outcome_payload(job: &Job, outcome: &RunOutcome) -> Value {
    terminal_payload(job, outcome)
}
