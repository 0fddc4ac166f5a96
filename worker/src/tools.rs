//! Constrained tool surface the agent drives during the tool-call loop.
//!
//! Every handler that touches the filesystem authorizes its path against the
//! allow-list before executing; the post-hoc worktree diff check in the
//! attempt loop is the second layer. Handler failures are converted to
//! structured error results visible to the agent in the next step's history,
//! never loop aborts.

use std::fs;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::{Map, Value, json};
use tracing::{instrument, warn};

use crate::core::guardrail;
use crate::io::git::Git;
use crate::io::process::{run_command_with_timeout, tail};

const READ_FILE_MAX_CHARS: usize = 12_000;
const DIFF_MAX_CHARS: usize = 20_000;
const GREP_MAX_RESULTS: usize = 50;
const CMD_OUTPUT_TAIL_CHARS: usize = 4_000;
const CMD_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const CMD_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// Command prefixes `run_cmd` accepts; anything else is rejected.
const ALLOWED_CMD_PREFIXES: [&[&str]; 6] = [
    &["npm", "ci"],
    &["npm", "install"],
    &["npm", "test"],
    &["git", "status"],
    &["git", "diff"],
    &["git", "add"],
];

/// Declared tool specification sent to the agent each step.
pub static TOOL_SPEC: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "tools": [
            {"name": "list_files", "args": {}},
            {"name": "read_file", "args": {"path": "string"}},
            {"name": "write_file", "args": {"path": "string", "content": "string"}},
            {"name": "grep", "args": {"pattern": "string"}},
            {"name": "git_status", "args": {}},
            {"name": "git_diff", "args": {}},
            {"name": "run_cmd", "args": {"cmd": ["string"], "cwd": "string(optional)"}},
            {"name": "git_commit", "args": {"message": "string"}},
            {"name": "final", "args": {"summary": "string"}},
        ],
        "rules": [
            "Respond with EXACTLY ONE JSON object.",
            "Either {\"type\":\"tool_call\",\"tool\":\"...\",\"args\":{...}} or {\"type\":\"final\",\"summary\":\"...\"}.",
            "Never edit files outside the allowed paths.",
            "Prefer small steps: read before write; keep diffs minimal.",
            "Do NOT push or create PRs; the worker will do that after all tests pass.",
            "If npm ci fails because package.json and package-lock.json are out of sync, run `npm install --package-lock-only` in the failing package directory and commit the lockfile.",
        ],
    })
});

/// Everything a tool handler may touch.
pub struct ToolContext<'a> {
    pub git: &'a Git,
    pub allowed_paths: &'a [String],
    pub issue_number: u64,
}

/// Execute one tool call, converting any failure into a structured error
/// result. Unknown tool names get an error result too, not a fault.
#[instrument(skip_all, fields(tool))]
pub fn dispatch(ctx: &ToolContext<'_>, tool: &str, args: &Map<String, Value>) -> Value {
    let result = match tool {
        "list_files" => list_files(ctx),
        "read_file" => read_file(ctx, str_arg(args, "path")),
        "write_file" => write_file(ctx, str_arg(args, "path"), str_arg(args, "content")),
        "grep" => grep(ctx, str_arg(args, "pattern")),
        "git_status" => git_status(ctx),
        "git_diff" => git_diff(ctx),
        "run_cmd" => run_cmd(ctx, args),
        "git_commit" => git_commit(ctx, args),
        _ => Err(anyhow!("unknown_tool: {tool}")),
    };
    match result {
        Ok(value) => value,
        Err(err) => {
            warn!(tool, err = %err, "tool call failed");
            json!({"error": format!("{err:#}")})
        }
    }
}

fn str_arg(args: &Map<String, Value>, key: &str) -> String {
    args.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn list_files(ctx: &ToolContext<'_>) -> Result<Value> {
    let files = ctx.git.ls_files(ctx.allowed_paths)?;
    Ok(json!({"files": files}))
}

fn read_file(ctx: &ToolContext<'_>, path: String) -> Result<Value> {
    guardrail::ensure_path_allowed(&path, ctx.allowed_paths)?;
    let full = ctx.git.workdir().join(&path);
    if !full.is_file() {
        return Ok(json!({"path": path, "exists": false}));
    }
    let mut content = fs::read_to_string(&full)?;
    if content.len() > READ_FILE_MAX_CHARS {
        let mut cut = READ_FILE_MAX_CHARS;
        while !content.is_char_boundary(cut) {
            cut -= 1;
        }
        content.truncate(cut);
        content.push_str("\n...(truncated)\n");
    }
    Ok(json!({"path": path, "exists": true, "content": content}))
}

fn write_file(ctx: &ToolContext<'_>, path: String, content: String) -> Result<Value> {
    guardrail::ensure_path_allowed(&path, ctx.allowed_paths)?;
    let full = ctx.git.workdir().join(&path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&full, &content)?;
    Ok(json!({"path": path, "written": true, "bytes": content.len()}))
}

fn grep(ctx: &ToolContext<'_>, pattern: String) -> Result<Value> {
    let matches = ctx.git.grep(&pattern, ctx.allowed_paths)?;
    let truncated = matches.len() > GREP_MAX_RESULTS;
    let kept: Vec<&String> = matches.iter().take(GREP_MAX_RESULTS).collect();
    Ok(json!({"matches": kept, "truncated": truncated}))
}

fn git_status(ctx: &ToolContext<'_>) -> Result<Value> {
    Ok(json!({"porcelain": ctx.git.status_porcelain()?}))
}

fn git_diff(ctx: &ToolContext<'_>) -> Result<Value> {
    let mut diff = ctx.git.diff_text(ctx.allowed_paths)?;
    if diff.len() > DIFF_MAX_CHARS {
        let mut cut = DIFF_MAX_CHARS;
        while !diff.is_char_boundary(cut) {
            cut -= 1;
        }
        diff.truncate(cut);
        diff.push_str("\n...(truncated)\n");
    }
    Ok(json!({"diff": diff}))
}

fn run_cmd(ctx: &ToolContext<'_>, args: &Map<String, Value>) -> Result<Value> {
    let cmd: Vec<String> = match args.get("cmd") {
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => return Err(anyhow!("cmd must be an array of strings")),
    };
    let allowed = ALLOWED_CMD_PREFIXES.iter().any(|prefix| {
        cmd.len() >= prefix.len() && cmd.iter().zip(prefix.iter()).all(|(a, b)| a == b)
    });
    if !allowed {
        return Err(anyhow!("command not allowed: {cmd:?}"));
    }

    let cwd = args.get("cwd").and_then(Value::as_str);
    let workdir = match cwd {
        Some(rel) if !rel.is_empty() => {
            guardrail::ensure_path_allowed(rel, ctx.allowed_paths)?;
            ctx.git.workdir().join(rel)
        }
        _ => ctx.git.workdir().to_path_buf(),
    };

    let mut command = Command::new(&cmd[0]);
    command.args(&cmd[1..]).current_dir(workdir);
    let out = run_command_with_timeout(command, CMD_TIMEOUT, CMD_OUTPUT_LIMIT_BYTES, &[])?;
    Ok(json!({
        "exit_code": out.status.code(),
        "stdout": tail(&out.stdout, CMD_OUTPUT_TAIL_CHARS),
        "stderr": tail(&out.stderr, CMD_OUTPUT_TAIL_CHARS),
        "timed_out": out.timed_out,
    }))
}

/// Local commit requested by the agent.
///
/// The guardrail runs both before and after staging so a single message
/// cannot smuggle a commit of disallowed paths.
fn git_commit(ctx: &ToolContext<'_>, args: &Map<String, Value>) -> Result<Value> {
    let message = args
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("agent: issue #{}", ctx.issue_number));

    guardrail::check_paths(&ctx.git.changed_paths()?, ctx.allowed_paths)?;
    ctx.git.add_all()?;
    guardrail::check_paths(&ctx.git.changed_paths()?, ctx.allowed_paths)?;
    let out = ctx.git.commit(&message)?;
    if !out.success() {
        return Ok(json!({
            "ok": false,
            "stdout": tail(&out.stdout, 2_000),
            "stderr": tail(&out.stderr, 2_000),
        }));
    }
    Ok(json!({"ok": true}))
}
