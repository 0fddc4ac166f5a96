//! Job intake: schema validation, defaults, and credential handling.
//!
//! A job arrives as a JSON object on a fixed-name environment channel. It is
//! validated against an embedded JSON Schema before anything else happens, so
//! a malformed job fails fast with every violation listed at once.

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Path prefixes the agent may touch when the job does not name its own.
pub const DEFAULT_ALLOWED_PATHS: [&str; 2] = ["source/ui-deployment", "source/ui-portal"];

/// Default base branch when the job omits one.
pub const DEFAULT_BASE_BRANCH: &str = "main";

const JOB_SCHEMA: &str = include_str!("../../schemas/job.schema.json");

/// One unit of work: act on an issue in a repository, on a target branch.
///
/// Unknown fields are preserved in `extra` so callers can forward newer job
/// shapes without this crate rejecting them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub run_id: String,
    /// Repository coordinate in `owner/name` form.
    pub repo: String,
    pub issue_number: u64,
    /// Branch the worker commits to (created from `base_branch` if absent).
    pub branch: String,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    /// Path prefixes file mutations are restricted to.
    #[serde(default = "default_allowed_paths")]
    pub allowed_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    /// Endpoint identifier for the reasoning agent. When absent, the worker
    /// only verifies the workspace and finalizes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_runtime: Option<String>,
    /// Free-text feedback carried into the agent prompt (e.g. review comments).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn default_base_branch() -> String {
    DEFAULT_BASE_BRANCH.to_string()
}

fn default_allowed_paths() -> Vec<String> {
    DEFAULT_ALLOWED_PATHS.iter().map(|s| s.to_string()).collect()
}

impl Job {
    /// Parse and validate a job from its JSON transport encoding.
    ///
    /// Schema violations are aggregated into a single error listing each one.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw).context("job is not valid JSON")?;
        if !value.is_object() {
            bail!("job must be a JSON object");
        }
        validate_job_schema(&value)?;
        let job: Job = serde_json::from_value(value).context("parse job fields")?;
        parse_repo(&job.repo)?;
        if job.allowed_paths.is_empty() {
            bail!("allowed_paths must not be empty");
        }
        Ok(job)
    }

    /// `(owner, name)` halves of the repository coordinate.
    pub fn repo_parts(&self) -> Result<(&str, &str)> {
        parse_repo(&self.repo)
    }
}

/// Split an `owner/name` coordinate, rejecting anything else.
pub fn parse_repo(repo: &str) -> Result<(&str, &str)> {
    let mut parts = repo.splitn(2, '/');
    let owner = parts.next().unwrap_or_default();
    let name = parts.next().unwrap_or_default();
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return Err(anyhow!("repo must be in 'owner/name' format, got: {repo}"));
    }
    Ok((owner, name))
}

/// Validate a job instance against the embedded schema (Draft 2020-12).
fn validate_job_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(JOB_SCHEMA).context("parse embedded job schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile job schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("job failed schema validation:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

/// Secret credential delivered on its own channel.
#[derive(Debug, Clone, Deserialize)]
pub struct Credential {
    pub token: String,
}

impl Credential {
    /// Parse the credential channel. Missing or empty token is fatal.
    pub fn from_json(raw: &str) -> Result<Self> {
        let cred: Credential =
            serde_json::from_str(raw).context("credential is not a valid JSON object")?;
        if cred.token.trim().is_empty() {
            bail!("credential token missing/empty");
        }
        Ok(cred)
    }
}

/// Redacted fingerprint of a token, safe to log.
///
/// Confirms secret injection without ever exposing the secret itself.
pub fn token_fingerprint(token: Option<&str>) -> String {
    let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
        return "missing".to_string();
    };
    if token.len() <= 8 {
        return "present(len<=8)".to_string();
    }
    let suffix: String = token.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("present(len={},suffix=...{})", token.len(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_job() -> Value {
        json!({
            "run_id": "r1",
            "repo": "acme/widgets",
            "issue_number": 42,
            "branch": "agent/issue-42"
        })
    }

    #[test]
    fn minimal_job_gets_defaults() {
        let job = Job::from_json(&minimal_job().to_string()).expect("parse job");
        assert_eq!(job.base_branch, "main");
        assert_eq!(
            job.allowed_paths,
            vec!["source/ui-deployment", "source/ui-portal"]
        );
        assert!(job.callback_url.is_none());
        assert!(job.agent_runtime.is_none());
    }

    #[test]
    fn missing_required_fields_aggregate_errors() {
        let err = Job::from_json(r#"{"run_id":"r1"}"#).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("repo"), "mentions repo: {msg}");
        assert!(msg.contains("issue_number"), "mentions issue_number: {msg}");
        assert!(msg.contains("branch"), "mentions branch: {msg}");
    }

    #[test]
    fn extra_fields_are_preserved() {
        let mut value = minimal_job();
        value["priority"] = json!("high");
        let job = Job::from_json(&value.to_string()).expect("parse job");
        assert_eq!(job.extra.get("priority"), Some(&json!("high")));
    }

    #[test]
    fn rejects_bad_repo_coordinates() {
        for repo in ["acme", "/widgets", "acme/", "acme/widgets/extra"] {
            let mut value = minimal_job();
            value["repo"] = json!(repo);
            assert!(Job::from_json(&value.to_string()).is_err(), "repo {repo}");
        }
    }

    #[test]
    fn rejects_negative_issue_number() {
        let mut value = minimal_job();
        value["issue_number"] = json!(-1);
        assert!(Job::from_json(&value.to_string()).is_err());
    }

    #[test]
    fn rejects_empty_allowed_paths() {
        let mut value = minimal_job();
        value["allowed_paths"] = json!([]);
        assert!(Job::from_json(&value.to_string()).is_err());
    }

    #[test]
    fn credential_requires_nonempty_token() {
        assert!(Credential::from_json(r#"{"token":"  "}"#).is_err());
        assert!(Credential::from_json(r#"{}"#).is_err());
        let cred = Credential::from_json(r#"{"token":"ghp_abcdef"}"#).expect("cred");
        assert_eq!(cred.token, "ghp_abcdef");
    }

    #[test]
    fn fingerprint_never_contains_full_token() {
        assert_eq!(token_fingerprint(None), "missing");
        assert_eq!(token_fingerprint(Some("   ")), "missing");
        assert_eq!(token_fingerprint(Some("short")), "present(len<=8)");
        let fp = token_fingerprint(Some("ghp_supersecret1234"));
        assert_eq!(fp, "present(len=19,suffix=...1234)");
        assert!(!fp.contains("supersecret"));
    }
}
