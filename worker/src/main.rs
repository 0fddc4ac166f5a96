//! Worker process entry point.
//!
//! Input arrives on fixed-name environment channels: `JOB_JSON` (the job
//! description) and `GITHUB_PAT_JSON` (the credential, `{"token": "..."}`).
//! `MAX_FIX_ATTEMPTS` optionally overrides the attempt budget.
//!
//! Exit code 0 covers every terminal non-exceptional outcome (no-op, PR
//! created, PR reused); anything else exits 1 after emitting a final
//! structured error event and a best-effort failure callback.

use std::env;

use anyhow::{Context, Result, anyhow};
use tracing::{error, info};

use worker::core::job::{Credential, Job, token_fingerprint};
use worker::exit_codes;
use worker::io::agent::{AgentRuntime, HttpAgentRuntime};
use worker::io::callback::{HttpStatusSink, NullStatusSink, StatusSink};
use worker::io::github::{GithubClient, authenticated_remote_url};
use worker::run::{RunConfig, RunDeps, outcome_payload, run_job};
use worker::verify::NpmVerifier;

fn main() {
    worker::logging::init();
    if let Err(err) = run() {
        error!(err = %format!("{err:#}"), "worker failed");
        eprintln!("{err:#}");
        std::process::exit(exit_codes::FAILED);
    }
    std::process::exit(exit_codes::OK);
}

fn run() -> Result<()> {
    let job_raw = require_env("JOB_JSON")?;
    let job = Job::from_json(&job_raw)?;

    let cred_raw = require_env("GITHUB_PAT_JSON")?;
    let credential = Credential::from_json(&cred_raw)?;

    info!(
        run_id = %job.run_id,
        repo = %job.repo,
        issue_number = job.issue_number,
        branch = %job.branch,
        base_branch = %job.base_branch,
        allowed_paths = ?job.allowed_paths,
        github_pat = %token_fingerprint(Some(&credential.token)),
        "worker start"
    );

    let mut config = RunConfig::default();
    if let Ok(raw) = env::var("MAX_FIX_ATTEMPTS") {
        let attempts: u32 = raw
            .trim()
            .parse()
            .with_context(|| format!("MAX_FIX_ATTEMPTS is not a number: {raw}"))?;
        config.max_fix_attempts = attempts.max(1);
    }

    let issues = GithubClient::new(credential.token.clone())?;
    let agent_runtime = match &job.agent_runtime {
        Some(endpoint) => Some(HttpAgentRuntime::new(endpoint.clone())?),
        None => None,
    };
    let status: Box<dyn StatusSink> = match &job.callback_url {
        Some(url) if !url.trim().is_empty() => Box::new(HttpStatusSink::new(url.clone())),
        _ => Box::new(NullStatusSink),
    };
    let verifier = NpmVerifier::default();

    let deps = RunDeps {
        issues: &issues,
        agent: agent_runtime.as_ref().map(|r| r as &dyn AgentRuntime),
        verifier: &verifier,
        status: status.as_ref(),
        remote_url: authenticated_remote_url(&job.repo, &credential.token)?,
        redact: vec![credential.token.clone()],
    };

    let outcome = run_job(&job, &deps, &config)?;
    info!(payload = %outcome_payload(&job, &outcome), "worker done");
    Ok(())
}

fn require_env(name: &str) -> Result<String> {
    let value = env::var(name).map_err(|_| anyhow!("missing env var {name}"))?;
    if value.trim().is_empty() {
        return Err(anyhow!("env var {name} is empty"));
    }
    Ok(value)
}
