//! Compact deterministic repository snapshot for the agent prompt.

use std::fs;

use anyhow::Result;
use tracing::debug;

use crate::io::git::Git;

/// Manifest/config files always offered to the agent when present.
const MANIFEST_FILES: [&str; 4] = [
    "source/ui-deployment/package.json",
    "source/ui-portal/package.json",
    "source/ui-deployment/vite.config.ts",
    "source/ui-portal/vite.config.ts",
];

/// Build the context blob: tracked files under the allow-list plus a small
/// fixed set of manifests, bounded by `max_chars`.
///
/// Deterministic for a given workspace state, so repeated steps see the same
/// snapshot unless the agent changed something.
pub fn collect_context(git: &Git, allowed_paths: &[String], max_chars: usize) -> Result<String> {
    let mut parts: Vec<String> = Vec::new();

    parts.push("## Repo file list (allowed paths only)\n".to_string());
    match git.ls_files(allowed_paths) {
        Ok(files) => parts.push(files.join("\n") + "\n"),
        Err(err) => parts.push(format!("(git ls-files failed: {err:#})\n")),
    }

    for rel in MANIFEST_FILES {
        let path = git.workdir().join(rel);
        if !path.is_file() {
            continue;
        }
        let Ok(contents) = fs::read_to_string(&path) else {
            continue;
        };
        parts.push(format!("\n## File: {rel}\n"));
        parts.push(contents);
    }

    let mut blob = parts.join("\n");
    if blob.len() > max_chars {
        let mut cut = max_chars;
        while !blob.is_char_boundary(cut) {
            cut -= 1;
        }
        blob.truncate(cut);
        blob.push_str("\n\n...(truncated)\n");
        debug!(max_chars, "context truncated");
    }
    Ok(blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn lists_only_allowed_files_and_includes_manifests() {
        let repo = TestRepo::new().expect("repo");
        repo.commit_file(
            "source/ui-portal/package.json",
            "{\"name\":\"portal\"}\n",
            "add manifest",
        )
        .expect("commit");
        repo.commit_file("infra/stack.ts", "export {}\n", "add infra")
            .expect("commit");

        let git = Git::new(repo.root());
        let allowed = vec!["source/ui-portal".to_string()];
        let blob = collect_context(&git, &allowed, 100_000).expect("context");

        assert!(blob.contains("source/ui-portal/package.json"));
        assert!(blob.contains("\"name\":\"portal\""));
        assert!(!blob.contains("infra/stack.ts"));
    }

    #[test]
    fn truncates_to_budget() {
        let repo = TestRepo::new().expect("repo");
        repo.commit_file(
            "source/ui-portal/package.json",
            &"x".repeat(5000),
            "big manifest",
        )
        .expect("commit");

        let git = Git::new(repo.root());
        let allowed = vec!["source/ui-portal".to_string()];
        let blob = collect_context(&git, &allowed, 500).expect("context");

        assert!(blob.len() < 600);
        assert!(blob.contains("...(truncated)"));
    }
}
