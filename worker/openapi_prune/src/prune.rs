//! Pruning core: path selection, bulk-field stripping, and transitive
//! component reachability.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde_json::{Map, Value, json};

/// Keys dropped everywhere in the document. They carry prose and examples
/// that dominate the size of published API specs but add nothing for
/// machine consumption.
const STRIP_KEYS: [&str; 24] = [
    "description",
    "summary",
    "externalDocs",
    "examples",
    "example",
    "x-codeSamples",
    "x-codegen-request-body-name",
    "x-github",
    "x-github-enterprise",
    "x-githubCloudOnly",
    "x-githubEnterpriseOnly",
    "x-githubInternal",
    "x-github-internal",
    "x-github-beta",
    "x-github-preview",
    "x-githubApiVersion",
    "x-githubApiVersionIntroduced",
    "x-githubApiVersionDeprecated",
    "x-githubApiVersionRemoved",
    "x-github-deprecation-date",
    "x-github-package",
    "x-github-redirect-url",
    "x-github-metadata",
    "x-logo",
];

/// Vendor extensions kept despite the blanket `x-` drop.
const KEPT_EXTENSIONS: [&str; 1] = ["x-amazon-apigateway-integration"];

/// Which paths to keep: a path survives if it starts with any prefix or
/// matches any regex.
pub struct PathFilter {
    pub prefixes: Vec<String>,
    pub regexes: Vec<Regex>,
}

impl PathFilter {
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty() && self.regexes.is_empty()
    }

    fn matches(&self, path: &str) -> bool {
        self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
            || self.regexes.iter().any(|r| r.is_match(path))
    }
}

/// Prune an OpenAPI 3.x document to the selected paths plus every component
/// they reach through `$ref`, with bulk text fields stripped throughout.
pub fn prune(spec: &Value, filter: &PathFilter) -> Value {
    let kept_paths: Map<String, Value> = spec["paths"]
        .as_object()
        .map(|paths| {
            paths
                .iter()
                .filter(|(p, _)| filter.matches(p))
                .map(|(p, item)| (p.clone(), item.clone()))
                .collect()
        })
        .unwrap_or_default();

    let mut out = json!({
        "openapi": spec.get("openapi").cloned().unwrap_or_else(|| json!("3.0.0")),
        "info": non_null(spec.get("info"))
            .unwrap_or_else(|| json!({"title": "Pruned API", "version": "0.0.0"})),
        "servers": non_null(spec.get("servers")).unwrap_or_else(|| json!([])),
        "paths": kept_paths,
        "components": non_null(spec.get("components")).unwrap_or_else(|| json!({})),
    });
    // Strip before the reachability walk; it shrinks the traversal.
    out = strip_big_fields(&out);

    let components = out["components"].clone();
    let needed = reachable_components(&out["paths"], &components);

    let mut rebuilt: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
    for (comp_type, comp_name) in &needed {
        if let Some(obj) = components
            .get(comp_type)
            .and_then(|bucket| bucket.get(comp_name))
        {
            rebuilt
                .entry(comp_type.clone())
                .or_default()
                .insert(comp_name.clone(), obj.clone());
        }
    }
    out["components"] = serde_json::to_value(rebuilt).unwrap_or_else(|_| json!({}));
    out
}

fn non_null(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| !v.is_null()).cloned()
}

/// Drop STRIP_KEYS and (almost all) vendor extensions, recursively.
fn strip_big_fields(node: &Value) -> Value {
    match node {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| {
                    !STRIP_KEYS.contains(&k.as_str())
                        && (!k.starts_with("x-") || KEPT_EXTENSIONS.contains(&k.as_str()))
                })
                .map(|(k, v)| (k.clone(), strip_big_fields(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_big_fields).collect()),
        other => other.clone(),
    }
}

/// `(type, name)` pairs under `#/components/` transitively reachable from
/// `roots` via `$ref`, including refs between components.
fn reachable_components(roots: &Value, components: &Value) -> BTreeSet<(String, String)> {
    let mut needed: BTreeSet<(String, String)> = BTreeSet::new();
    let mut queue: Vec<(String, String)> = Vec::new();

    let mut add = |refs: Vec<String>, needed: &mut BTreeSet<_>, queue: &mut Vec<_>| {
        for r in refs {
            if let Some(parsed) = parse_component_ref(&r) {
                if needed.insert(parsed.clone()) {
                    queue.push(parsed);
                }
            }
        }
    };

    add(collect_refs(roots), &mut needed, &mut queue);

    while let Some((comp_type, comp_name)) = queue.pop() {
        if let Some(obj) = components
            .get(&comp_type)
            .and_then(|bucket| bucket.get(&comp_name))
        {
            add(collect_refs(obj), &mut needed, &mut queue);
        }
    }

    needed
}

fn collect_refs(node: &Value) -> Vec<String> {
    let mut refs = Vec::new();
    walk_refs(node, &mut refs);
    refs
}

fn walk_refs(node: &Value, out: &mut Vec<String>) {
    match node {
        Value::Object(map) => {
            if let Some(r) = map.get("$ref").and_then(Value::as_str) {
                out.push(r.to_string());
            }
            for v in map.values() {
                walk_refs(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                walk_refs(v, out);
            }
        }
        _ => {}
    }
}

/// `#/components/{type}/{name}` (name may itself contain slashes).
fn parse_component_ref(r: &str) -> Option<(String, String)> {
    let rest = r.strip_prefix("#/components/")?;
    let (comp_type, comp_name) = rest.split_once('/')?;
    if comp_name.is_empty() {
        return None;
    }
    Some((comp_type.to_string(), comp_name.to_string()))
}
