//! Allow-list containment checks for file mutations.
//!
//! The same membership rule is applied at two layers: per tool call before a
//! read/write/command executes, and post-hoc over the worktree diff after any
//! stage that may have mutated the workspace. The diff check is the backstop
//! for anything an individually-authorized call managed to smuggle through.

use anyhow::{Result, bail};

/// True if `path` equals an allowed prefix or is nested under one.
///
/// Paths are normalized first: backslashes become `/` and leading slashes are
/// stripped, so the rule holds for whatever shape the agent hands us.
pub fn path_allowed(path: &str, allowed: &[String]) -> bool {
    let p = normalize(path);
    if p.is_empty() {
        return false;
    }
    allowed.iter().any(|prefix| {
        let prefix = prefix.trim_end_matches('/');
        p == prefix || p.starts_with(&format!("{prefix}/"))
    })
}

/// Enumerate changed paths that fall outside the allow-list.
pub fn disallowed<'a>(changed: &'a [String], allowed: &[String]) -> Vec<&'a str> {
    changed
        .iter()
        .filter(|p| !path_allowed(p, allowed))
        .map(String::as_str)
        .collect()
}

/// Fail with every offending path listed if any change escapes the allow-list.
pub fn check_paths(changed: &[String], allowed: &[String]) -> Result<()> {
    let bad = disallowed(changed, allowed);
    if !bad.is_empty() {
        bail!(
            "guardrail violation: changed files outside allowed paths: [{}]",
            bad.join(", ")
        );
    }
    Ok(())
}

/// Authorize a single path before a tool call touches it.
pub fn ensure_path_allowed(path: &str, allowed: &[String]) -> Result<()> {
    if !path_allowed(path, allowed) {
        bail!("path not allowed: {path}");
    }
    Ok(())
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}
