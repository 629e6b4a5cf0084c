//! cmx-config
//!
//! Layered YAML configuration for the desk daemon and CLI.
//!
//! Layers merge in order (later overrides earlier). The merged document is
//! canonicalized to JSON and hashed with SHA-256 so a running daemon can
//! report exactly which configuration it booted with. Config files name
//! environment variables for secrets; literal secrets are refused.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fs;

mod desk;
mod secrets;

pub use desk::{
    AuthConfig, CorsConfig, DatabaseConfig, DeskConfig, HubConfig, ServerConfig,
    DEFAULT_ADDR, DEFAULT_DB_URL_ENV, DEFAULT_TOKEN_SECRET_ENV,
};
pub use secrets::{resolve_secrets, resolve_secrets_with, ResolvedSecrets};

/// Env var holding a comma-separated list of YAML layer paths.
pub const ENV_CONFIG_PATHS: &str = "CMX_CONFIG";

/// Leaf string prefixes that look like credentials.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",
    "sk_live",
    "sk_test",
    "AKIA",
    "-----BEGIN",
    "ghp_",
    "gho_",
    "glpat-",
    "xoxb-",
    "xoxp-",
    "eyJ", // base64url JSON header, i.e. a pasted JWT
    "postgres://",
    "postgresql://",
];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// An empty document; every typed key takes its default.
    pub fn empty() -> Self {
        Self::hashed(json!({}))
    }

    /// Refuse secret literals, then fix the canonical form and its hash.
    fn seal(merged: Value) -> Result<Self> {
        reject_secret_literals(&merged)?;
        Ok(Self::hashed(merged))
    }

    fn hashed(config_json: Value) -> Self {
        // serde_json maps iterate in key order, so this text does not depend
        // on key order in the source layers.
        let canonical_json = config_json.to_string();
        let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
        Self {
            config_hash,
            canonical_json,
            config_json,
        }
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut merged = json!({});
    for path in paths {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read config layer {path}"))?;
        if let Some(layer) = parse_layer(path, &raw)? {
            merge_into(&mut merged, layer);
        }
    }
    LoadedConfig::seal(merged)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = json!({});
    for (i, raw) in yaml_docs.iter().enumerate() {
        if let Some(layer) = parse_layer(&format!("layer {i}"), raw)? {
            merge_into(&mut merged, layer);
        }
    }
    LoadedConfig::seal(merged)
}

/// Load the layers named by `CMX_CONFIG`, or an empty config when unset.
pub fn load_from_env() -> Result<LoadedConfig> {
    match std::env::var(ENV_CONFIG_PATHS) {
        Ok(raw) => {
            let paths = split_paths(&raw);
            if paths.is_empty() {
                return Ok(LoadedConfig::empty());
            }
            load_layered_yaml(&paths)
        }
        Err(_) => Ok(LoadedConfig::empty()),
    }
}

fn split_paths(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// One YAML layer as JSON. An empty document is `None` (no overrides).
fn parse_layer(label: &str, raw: &str) -> Result<Option<Value>> {
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(raw).with_context(|| format!("invalid yaml in {label}"))?;
    let layer =
        serde_json::to_value(yaml).with_context(|| format!("{label} has no json form"))?;
    Ok((!layer.is_null()).then_some(layer))
}

/// Overlay `layer` onto `base`: maps merge per key, anything else replaces.
fn merge_into(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base_map), Value::Object(layer_map)) => {
            for (key, value) in layer_map {
                match base_map.get_mut(&key) {
                    Some(slot) => merge_into(slot, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Call `visit` with the JSON pointer and value of every scalar leaf.
fn for_each_leaf(v: &Value, pointer: &mut String, visit: &mut dyn FnMut(&str, &Value)) {
    match v {
        Value::Object(map) => {
            for (key, child) in map {
                let len = pointer.len();
                pointer.push('/');
                pointer.push_str(&key.replace('~', "~0").replace('/', "~1"));
                for_each_leaf(child, pointer, visit);
                pointer.truncate(len);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                let len = pointer.len();
                pointer.push('/');
                pointer.push_str(&i.to_string());
                for_each_leaf(child, pointer, visit);
                pointer.truncate(len);
            }
        }
        leaf => visit(pointer, leaf),
    }
}

fn reject_secret_literals(doc: &Value) -> Result<()> {
    let mut offending: Option<String> = None;
    for_each_leaf(doc, &mut String::new(), &mut |pointer, leaf| {
        if offending.is_none() && leaf.as_str().is_some_and(looks_like_secret) {
            offending = Some(pointer.to_string());
        }
    });
    match offending {
        Some(pointer) => bail!("CONFIG_SECRET_DETECTED leaf={pointer} value=REDACTED"),
        None => Ok(()),
    }
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    t.len() >= 8 && SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Leaves that [`DeskConfig`] does not read.
///
/// The document is parsed into the typed config and serialized back; any
/// leaf missing from that round trip is ignored by the desk. Misspelled
/// sections and misspelled keys inside known sections both land here.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let typed: DeskConfig = serde_json::from_value(config_json.clone())
        .context("config does not match the desk schema")?;
    let consumed = serde_json::to_value(&typed).context("typed config serialize failed")?;

    let mut unused: Vec<String> = Vec::new();
    for_each_leaf(config_json, &mut String::new(), &mut |pointer, _| {
        if consumed.pointer(pointer).is_none() {
            unused.push(pointer.to_string());
        }
    });
    unused.sort();

    let report = UnusedKeyReport {
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s): {:?}",
            report.unused_leaf_pointers.len(),
            report.unused_leaf_pointers.iter().take(12).collect::<Vec<_>>()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_layer_is_ignored() {
        let a = load_layered_yaml_from_strings(&["server:\n  addr: 0.0.0.0:1\n", ""]).unwrap();
        assert_eq!(
            a.config_json.pointer("/server/addr").and_then(Value::as_str),
            Some("0.0.0.0:1")
        );
    }

    #[test]
    fn merge_keeps_siblings_and_replaces_lists() {
        let mut base = json!({"cors": {"allowed_origins": ["a", "b"]}, "hub": {"outbound_buffer": 4}});
        merge_into(
            &mut base,
            json!({"cors": {"allowed_origins": ["c"]}, "server": {"addr": "x"}}),
        );
        assert_eq!(
            base,
            json!({
                "cors": {"allowed_origins": ["c"]},
                "hub": {"outbound_buffer": 4},
                "server": {"addr": "x"}
            })
        );
    }

    #[test]
    fn leaf_pointers_escape_keys_and_index_arrays() {
        let doc = json!({"a/b": {"t~": 1}, "list": ["x", "y"]});
        let mut seen = Vec::new();
        for_each_leaf(&doc, &mut String::new(), &mut |p, _| seen.push(p.to_string()));
        assert_eq!(seen, vec!["/a~1b/t~0", "/list/0", "/list/1"]);
        for p in &seen {
            assert!(doc.pointer(p).is_some(), "{p}");
        }
    }

    #[test]
    fn split_paths_skips_blanks() {
        assert_eq!(split_paths(" a.yaml , ,b.yaml"), vec!["a.yaml", "b.yaml"]);
    }

    #[test]
    fn empty_config_hash_is_stable() {
        assert_eq!(LoadedConfig::empty().config_hash, LoadedConfig::empty().config_hash);
        assert_eq!(LoadedConfig::empty().canonical_json, "{}");
    }
}
