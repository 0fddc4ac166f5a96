//! End-to-end job lifecycle tests against local git remotes.
//!
//! The issue host, agent runtime, verifier, and status sink are scripted;
//! git operations (clone, branch setup, commit, push, no-op detection) run
//! for real against a bare repository created per test.

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde_json::{Value, json};

use worker::agent_loop::LoopConfig;
use worker::core::job::Job;
use worker::io::agent::AgentRuntime;
use worker::io::callback::StatusSink;
use worker::io::github::{Issue, IssueHost, NewPullRequest, PullRequest};
use worker::run::{RunConfig, RunDeps, RunOutcome, run_job};
use worker::test_support::{TestRemote, TestRepo, run_git};
use worker::verify::{PackageResult, TestFailure, TestSummary, Verifier, VerifyOutcome};

struct ScriptedHost {
    open_pr: Option<PullRequest>,
    created: RefCell<Vec<NewPullRequest>>,
}

impl ScriptedHost {
    fn new() -> Self {
        Self {
            open_pr: None,
            created: RefCell::new(Vec::new()),
        }
    }

    fn with_open_pr(number: u64) -> Self {
        Self {
            open_pr: Some(PullRequest {
                number,
                html_url: format!("https://example.test/pr/{number}"),
            }),
            created: RefCell::new(Vec::new()),
        }
    }
}

impl IssueHost for ScriptedHost {
    fn get_issue(&self, _repo: &str, number: u64) -> Result<Issue> {
        Ok(Issue {
            title: format!("Issue {number}"),
            body: "Fix the widget.".to_string(),
        })
    }

    fn find_open_pr(&self, _repo: &str, _branch: &str) -> Result<Option<PullRequest>> {
        Ok(self.open_pr.clone())
    }

    fn create_pr(&self, _repo: &str, pr: &NewPullRequest) -> Result<PullRequest> {
        self.created.borrow_mut().push(pr.clone());
        Ok(PullRequest {
            number: 101,
            html_url: "https://example.test/pr/101".to_string(),
        })
    }
}

struct ScriptedVerifier {
    outcomes: RefCell<Vec<VerifyOutcome>>,
    calls: RefCell<u32>,
}

impl ScriptedVerifier {
    /// Outcomes are consumed in order; the script must cover every call.
    fn new(mut outcomes: Vec<VerifyOutcome>) -> Self {
        outcomes.reverse();
        Self {
            outcomes: RefCell::new(outcomes),
            calls: RefCell::new(0),
        }
    }

    fn calls(&self) -> u32 {
        *self.calls.borrow()
    }
}

impl Verifier for ScriptedVerifier {
    fn verify(&self, _repo_dir: &Path) -> Result<VerifyOutcome> {
        *self.calls.borrow_mut() += 1;
        self.outcomes
            .borrow_mut()
            .pop()
            .ok_or_else(|| anyhow::anyhow!("verifier script exhausted"))
    }
}

/// Verifier that also drops a file outside the allow-list, simulating a
/// mutation the per-call tool checks never saw.
struct MutatingVerifier {
    inner: ScriptedVerifier,
}

impl Verifier for MutatingVerifier {
    fn verify(&self, repo_dir: &Path) -> Result<VerifyOutcome> {
        fs::write(repo_dir.join("smuggled.txt"), "oops")?;
        self.inner.verify(repo_dir)
    }
}

struct RecordingSink {
    events: RefCell<Vec<Value>>,
}

impl RecordingSink {
    fn new() -> Self {
        Self {
            events: RefCell::new(Vec::new()),
        }
    }

    fn statuses(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| e["status"].as_str().map(str::to_string))
            .collect()
    }

    fn last(&self) -> Value {
        self.events.borrow().last().cloned().unwrap_or(Value::Null)
    }
}

impl StatusSink for RecordingSink {
    fn post(&self, payload: &Value) {
        self.events.borrow_mut().push(payload.clone());
    }
}

struct ScriptedAgent {
    responses: RefCell<Vec<String>>,
}

impl ScriptedAgent {
    fn new(responses: Vec<&str>) -> Self {
        let mut responses: Vec<String> = responses.into_iter().map(str::to_string).collect();
        responses.reverse();
        Self {
            responses: RefCell::new(responses),
        }
    }
}

impl AgentRuntime for ScriptedAgent {
    fn invoke(&self, _session_id: &str, _input: &str) -> Result<String> {
        Ok(self
            .responses
            .borrow_mut()
            .pop()
            .unwrap_or_else(|| r#"{"type":"final","summary":"done"}"#.to_string()))
    }
}

fn passed_summary() -> VerifyOutcome {
    let mut summary = TestSummary::new();
    for key in ["ui_deployment", "ui_portal"] {
        summary.insert(
            key.to_string(),
            PackageResult {
                ok: true,
                step: None,
                stderr: None,
            },
        );
    }
    VerifyOutcome::Passed(summary)
}

fn failed_outcome(step: &str, stderr: &str) -> VerifyOutcome {
    let mut summary = TestSummary::new();
    summary.insert(
        "ui_deployment".to_string(),
        PackageResult {
            ok: false,
            step: Some(step.to_string()),
            stderr: Some(stderr.to_string()),
        },
    );
    VerifyOutcome::Failed {
        summary,
        failure: TestFailure {
            package: "source/ui-deployment".to_string(),
            step: step.to_string(),
            stderr: stderr.to_string(),
        },
    }
}

fn job(allowed: &[&str]) -> Job {
    Job::from_json(
        &json!({
            "run_id": "r1",
            "repo": "acme/widgets",
            "issue_number": 42,
            "branch": "agent/issue-42",
            "base_branch": "main",
            "allowed_paths": allowed,
        })
        .to_string(),
    )
    .expect("job")
}

fn config(max_fix_attempts: u32) -> RunConfig {
    RunConfig {
        max_fix_attempts,
        loop_config: LoopConfig {
            max_steps: 10,
            history_window: 6,
            context_max_chars: 10_000,
        },
    }
}

fn seeded_remote() -> (TestRepo, TestRemote) {
    let seed = TestRepo::new().expect("seed repo");
    let remote = TestRemote::from_repo(&seed).expect("remote");
    (seed, remote)
}

#[test]
fn clean_run_without_agent_reports_no_changes() {
    let (_seed, remote) = seeded_remote();
    let host = ScriptedHost::new();
    let verifier = ScriptedVerifier::new(vec![passed_summary()]);
    let sink = RecordingSink::new();

    let deps = RunDeps {
        issues: &host,
        agent: None,
        verifier: &verifier,
        status: &sink,
        remote_url: remote.url(),
        redact: Vec::new(),
    };

    let outcome = run_job(&job(&["app/ui"]), &deps, &config(3)).expect("run");
    assert!(matches!(outcome, RunOutcome::NoChanges { .. }));
    assert_eq!(sink.statuses(), vec!["started", "no_changes"]);
    assert!(sink.last()["test_summary"]["ui_portal"]["ok"].as_bool().expect("summary"));
    // Nothing was pushed.
    assert_eq!(remote.branches().expect("branches"), vec!["main"]);
    assert!(host.created.borrow().is_empty());
}

#[test]
fn agent_change_is_committed_pushed_and_gets_a_pr() {
    let (_seed, remote) = seeded_remote();
    let host = ScriptedHost::new();
    let verifier = ScriptedVerifier::new(vec![passed_summary()]);
    let sink = RecordingSink::new();
    let agent = ScriptedAgent::new(vec![
        r#"{"type":"tool_call","tool":"write_file","args":{"path":"app/ui/fix.ts","content":"export const z = 1;"}}"#,
        r#"{"type":"final","summary":"patched"}"#,
    ]);

    let deps = RunDeps {
        issues: &host,
        agent: Some(&agent),
        verifier: &verifier,
        status: &sink,
        remote_url: remote.url(),
        redact: Vec::new(),
    };

    let outcome = run_job(&job(&["app/ui"]), &deps, &config(3)).expect("run");
    match outcome {
        RunOutcome::PrCreated {
            pr_number,
            pr_url,
            test_summary,
        } => {
            assert_eq!(pr_number, 101);
            assert!(pr_url.contains("/pr/101"));
            assert!(test_summary.values().all(|r| r.ok));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(sink.statuses(), vec!["started", "pr_created"]);
    let branches = remote.branches().expect("branches");
    assert!(branches.contains(&"agent/issue-42".to_string()), "{branches:?}");

    let created = host.created.borrow();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].head, "agent/issue-42");
    assert_eq!(created[0].base, "main");
    assert!(created[0].body.contains("Fixes #42"));
}

#[test]
fn existing_open_pr_is_reused_not_duplicated() {
    let (_seed, remote) = seeded_remote();
    let host = ScriptedHost::with_open_pr(55);
    let verifier = ScriptedVerifier::new(vec![passed_summary()]);
    let sink = RecordingSink::new();
    let agent = ScriptedAgent::new(vec![
        r#"{"type":"tool_call","tool":"write_file","args":{"path":"app/ui/fix.ts","content":"x"}}"#,
        r#"{"type":"final","summary":"patched"}"#,
    ]);

    let deps = RunDeps {
        issues: &host,
        agent: Some(&agent),
        verifier: &verifier,
        status: &sink,
        remote_url: remote.url(),
        redact: Vec::new(),
    };

    let outcome = run_job(&job(&["app/ui"]), &deps, &config(3)).expect("run");
    match outcome {
        RunOutcome::PrCreated { pr_number, .. } => assert_eq!(pr_number, 55),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(
        host.created.borrow().is_empty(),
        "must never create a second open PR for the branch"
    );
}

#[test]
fn rerun_on_merged_branch_with_no_diff_is_a_noop() {
    let (seed, remote) = seeded_remote();
    // Branch already exists on the remote at the same commit as main.
    run_git(seed.root(), &["checkout", "-b", "agent/issue-42"]).expect("branch");
    run_git(seed.root(), &["push", "origin", "agent/issue-42"]).expect("push");

    let host = ScriptedHost::new();
    let verifier = ScriptedVerifier::new(vec![passed_summary()]);
    let sink = RecordingSink::new();

    let deps = RunDeps {
        issues: &host,
        agent: None,
        verifier: &verifier,
        status: &sink,
        remote_url: remote.url(),
        redact: Vec::new(),
    };

    let outcome = run_job(&job(&["app/ui"]), &deps, &config(3)).expect("run");
    assert!(matches!(outcome, RunOutcome::NoChanges { .. }));
    assert_eq!(sink.last()["status"], json!("no_changes"));
    assert!(host.created.borrow().is_empty());
}

#[test]
fn attempts_are_capped_and_last_failure_surfaces() {
    let (_seed, remote) = seeded_remote();
    let host = ScriptedHost::new();
    let verifier = ScriptedVerifier::new(vec![
        failed_outcome("install", "first failure"),
        failed_outcome("test", "second failure"),
    ]);
    let sink = RecordingSink::new();

    let deps = RunDeps {
        issues: &host,
        agent: None,
        verifier: &verifier,
        status: &sink,
        remote_url: remote.url(),
        redact: Vec::new(),
    };

    let err = run_job(&job(&["app/ui"]), &deps, &config(2)).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("test failed"), "surfaces last step: {msg}");
    assert!(msg.contains("second failure"), "surfaces last stderr: {msg}");
    assert!(!msg.contains("first failure"), "not the earlier one: {msg}");
    assert_eq!(verifier.calls(), 2, "never exceeds the attempt budget");

    assert_eq!(sink.statuses(), vec!["started", "failed"]);
    assert!(
        sink.last()["error"]
            .as_str()
            .expect("error text")
            .contains("second failure")
    );
}

#[test]
fn failure_then_success_ends_in_pr_created() {
    let (_seed, remote) = seeded_remote();
    let host = ScriptedHost::new();
    let verifier = ScriptedVerifier::new(vec![
        failed_outcome("install", "lockfile out of sync"),
        passed_summary(),
    ]);
    let sink = RecordingSink::new();
    // Attempt 1 writes the fix; attempt 2's loop finishes immediately.
    let agent = ScriptedAgent::new(vec![
        r#"{"type":"tool_call","tool":"write_file","args":{"path":"app/ui/package-lock.json","content":"{}"}}"#,
        r#"{"type":"final","summary":"synced lockfile"}"#,
        r#"{"type":"final","summary":"nothing more to do"}"#,
    ]);

    let deps = RunDeps {
        issues: &host,
        agent: Some(&agent),
        verifier: &verifier,
        status: &sink,
        remote_url: remote.url(),
        redact: Vec::new(),
    };

    let outcome = run_job(&job(&["app/ui"]), &deps, &config(3)).expect("run");
    match outcome {
        RunOutcome::PrCreated { test_summary, .. } => {
            assert!(test_summary.values().all(|r| r.ok));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(verifier.calls(), 2);
    assert_eq!(sink.last()["status"], json!("pr_created"));
}

#[test]
fn out_of_allowlist_change_trips_guardrail_before_any_commit() {
    let (_seed, remote) = seeded_remote();
    let host = ScriptedHost::new();
    // Attempt 1: verifier smuggles a disallowed file into the worktree and
    // fails. Attempt 2: the post-hoc diff check catches it before anything
    // can be committed.
    let verifier = MutatingVerifier {
        inner: ScriptedVerifier::new(vec![failed_outcome("test", "flaky")]),
    };
    let sink = RecordingSink::new();

    let deps = RunDeps {
        issues: &host,
        agent: None,
        verifier: &verifier,
        status: &sink,
        remote_url: remote.url(),
        redact: Vec::new(),
    };

    let err = run_job(&job(&["app/ui"]), &deps, &config(2)).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("guardrail violation"), "{msg}");
    assert!(msg.contains("smuggled.txt"), "{msg}");

    // No commit was pushed anywhere.
    assert_eq!(remote.branches().expect("branches"), vec!["main"]);
    assert!(host.created.borrow().is_empty());
}
