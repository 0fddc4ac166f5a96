//! Bounded conversational tool-call loop between the reasoning agent and the
//! worker's constrained execution surface.
//!
//! Each step sends one prompt (instructions, identifiers, issue text,
//! feedback, tool spec, recent history window, repository snapshot) and
//! expects exactly one structured message back: a tool call or a final
//! summary. Protocol violations consume a step and are recorded in history;
//! only transport failures from the runtime itself abort the loop.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::core::response::{AgentMessage, parse_agent_message};
use crate::core::session::sanitize_session_id;
use crate::io::agent::AgentRuntime;
use crate::io::context::collect_context;
use crate::io::git::Git;
use crate::io::prompt::{PromptInputs, build_prompt};
use crate::tools::{TOOL_SPEC, ToolContext, dispatch};

/// Tuning knobs for the loop (fixed in production, small in tests).
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Step budget; exhausting it is an outcome, not a failure.
    pub max_steps: u32,
    /// How many recent history entries are replayed into each prompt.
    pub history_window: usize,
    /// Character budget for the repository context snapshot.
    pub context_max_chars: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_steps: 25,
            history_window: 6,
            context_max_chars: 60_000,
        }
    }
}

/// Job-scoped inputs for one loop invocation.
#[derive(Debug, Clone)]
pub struct LoopRequest {
    pub repo: String,
    pub issue_number: u64,
    pub issue_title: String,
    pub issue_body: String,
    pub branch: String,
    pub base_branch: String,
    pub allowed_paths: Vec<String>,
    pub feedback: Option<String>,
}

/// How the loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The agent declared completion with a summary.
    Final { summary: String },
    /// The step budget ran out before a final message. The workspace state is
    /// still handed to verification.
    StepBudgetExhausted,
}

/// Drive the loop to completion or budget exhaustion.
///
/// History is append-only within this invocation and discarded when it
/// returns; continuity across steps comes from replaying the most recent
/// window into each prompt.
#[instrument(skip_all, fields(issue = request.issue_number, branch = %request.branch))]
pub fn run_agent_loop(
    runtime: &dyn AgentRuntime,
    git: &Git,
    request: &LoopRequest,
    config: &LoopConfig,
) -> Result<LoopOutcome> {
    let session_id = sanitize_session_id(&format!(
        "{}-issue-{}",
        request.repo, request.issue_number
    ));
    let mut history: Vec<Value> = Vec::new();

    for step in 1..=config.max_steps {
        let context = collect_context(git, &request.allowed_paths, config.context_max_chars)?;
        let window_start = history.len().saturating_sub(config.history_window);
        let prompt = build_prompt(&PromptInputs {
            repo: request.repo.clone(),
            branch: request.branch.clone(),
            base_branch: request.base_branch.clone(),
            issue_number: request.issue_number,
            issue_title: request.issue_title.clone(),
            issue_body: request.issue_body.clone(),
            allowed_paths: request.allowed_paths.clone(),
            feedback: request.feedback.clone(),
            tool_spec: TOOL_SPEC.clone(),
            history: history[window_start..].to_vec(),
            context,
        })?;

        let raw = runtime
            .invoke(&session_id, &prompt)
            .with_context(|| format!("invoke agent runtime at step {step}"))?;

        let message = match parse_agent_message(&raw) {
            Ok(message) => message,
            Err(err) => {
                warn!(step, err = %err, "invalid agent message");
                let sample: String = raw.chars().take(300).collect();
                history.push(json!({
                    "step": step,
                    "error": "invalid_agent_message",
                    "raw_sample": sample,
                }));
                continue;
            }
        };

        match message {
            AgentMessage::Final { summary } => {
                info!(step, "agent finished");
                return Ok(LoopOutcome::Final { summary });
            }
            AgentMessage::ToolCall { tool, args } => {
                info!(step, tool = %tool, "agent tool call");
                let ctx = ToolContext {
                    git,
                    allowed_paths: &request.allowed_paths,
                    issue_number: request.issue_number,
                };
                let result = dispatch(&ctx, &tool, &args);
                history.push(json!({
                    "step": step,
                    "tool": tool,
                    "args": Value::Object(args),
                    "result": result,
                }));
            }
        }
    }

    warn!(max_steps = config.max_steps, "step budget exhausted");
    Ok(LoopOutcome::StepBudgetExhausted)
}
