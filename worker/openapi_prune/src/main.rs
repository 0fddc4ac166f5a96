//! CLI for shrinking OpenAPI 3.x JSON documents.
//!
//! Hosted API specs (GitHub's dereferenced document is ~10MB) blow past the
//! 2MB schema-upload limit of the gateway that consumes them. This tool keeps
//! only selected paths plus the components they reference and strips bulk
//! text fields.

mod prune;

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use regex::Regex;
use serde_json::Value;

use crate::prune::{PathFilter, prune};

/// Built-in path selections, keyed by preset name.
///
/// `github-devops` covers the worker's tool surface: issues, pull requests,
/// actions, merge queues, and repository hooks. Regexes rather than a bare
/// `/repos/` prefix, which would pull in the entire surface area.
fn presets() -> BTreeMap<&'static str, Vec<&'static str>> {
    BTreeMap::from([(
        "github-devops",
        vec![
            r"^/repos/[^/]+/[^/]+/issues($|/)",
            r"^/repos/[^/]+/[^/]+/pulls($|/)",
            r"^/repos/[^/]+/[^/]+/actions($|/)",
            r"^/repos/[^/]+/[^/]+/merge-queues($|/)",
            r"^/repos/[^/]+/[^/]+/hooks($|/)",
        ],
    )])
}

#[derive(Parser)]
#[command(name = "openapi-prune")]
#[command(about = "Prune an OpenAPI 3.x JSON spec to selected paths plus referenced components")]
struct Cli {
    /// Input OpenAPI JSON file
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output OpenAPI JSON file
    #[arg(long = "out")]
    out_path: PathBuf,

    /// Built-in pruning preset
    #[arg(long)]
    preset: Option<String>,

    /// Keep paths starting with this prefix (repeatable)
    #[arg(long = "include-prefix")]
    include_prefix: Vec<String>,

    /// Keep paths matching this regex (repeatable)
    #[arg(long = "include-regex")]
    include_regex: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut regex_strs: Vec<String> = Vec::new();
    if let Some(name) = &cli.preset {
        let presets = presets();
        let Some(patterns) = presets.get(name.as_str()) else {
            bail!(
                "unknown preset {name:?}; available: {}",
                presets.keys().copied().collect::<Vec<_>>().join(", ")
            );
        };
        regex_strs.extend(patterns.iter().map(|p| (*p).to_string()));
    }
    regex_strs.extend(cli.include_regex.iter().cloned());

    let regexes = regex_strs
        .iter()
        .map(|r| Regex::new(r).with_context(|| format!("invalid regex {r:?}")))
        .collect::<Result<Vec<_>>>()?;

    let filter = PathFilter {
        prefixes: cli.include_prefix.clone(),
        regexes,
    };
    if filter.is_empty() {
        bail!("provide at least one --preset, --include-prefix, or --include-regex");
    }

    let raw = fs::read_to_string(&cli.in_path)
        .with_context(|| format!("read {}", cli.in_path.display()))?;
    let spec: Value = serde_json::from_str(&raw)
        .with_context(|| format!("parse {}", cli.in_path.display()))?;

    let pruned = prune(&spec, &filter);

    let rendered = serde_json::to_string_pretty(&pruned).context("serialize pruned spec")?;
    fs::write(&cli.out_path, rendered)
        .with_context(|| format!("write {}", cli.out_path.display()))?;

    let size = fs::metadata(&cli.out_path)?.len();
    println!(
        "Wrote {} ({:.2} MB)",
        cli.out_path.display(),
        size as f64 / 1024.0 / 1024.0
    );
    Ok(())
}
