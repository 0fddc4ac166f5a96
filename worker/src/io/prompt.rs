//! Prompt builder for the tool-call loop.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde_json::Value;

const TOOL_LOOP_TEMPLATE: &str = include_str!("prompts/tool_loop.md");

/// All inputs needed to render one step's prompt.
#[derive(Debug, Clone)]
pub struct PromptInputs {
    pub repo: String,
    pub branch: String,
    pub base_branch: String,
    pub issue_number: u64,
    pub issue_title: String,
    pub issue_body: String,
    pub allowed_paths: Vec<String>,
    /// Accumulated feedback: external review comments and/or the previous
    /// attempt's test failure.
    pub feedback: Option<String>,
    /// Declared tool specification (serialized into the prompt verbatim).
    pub tool_spec: Value,
    /// Bounded window of recent tool-call history entries.
    pub history: Vec<Value>,
    /// Repository context snapshot.
    pub context: String,
}

/// Render the tool-loop prompt for one step.
pub fn build_prompt(inputs: &PromptInputs) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("tool_loop", TOOL_LOOP_TEMPLATE)
        .context("tool loop template should be valid")?;
    let template = env.get_template("tool_loop")?;
    let rendered = template
        .render(context! {
            repo => inputs.repo,
            branch => inputs.branch,
            base_branch => inputs.base_branch,
            issue_number => inputs.issue_number,
            issue_title => inputs.issue_title,
            issue_body => inputs.issue_body,
            allowed_paths => serde_json::to_string(&inputs.allowed_paths)?,
            feedback => inputs
                .feedback
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty()),
            tool_spec => serde_json::to_string(&inputs.tool_spec)?,
            history => serde_json::to_string(&inputs.history)?,
            context => inputs.context,
        })
        .context("render tool loop prompt")?;
    Ok(rendered)
}
