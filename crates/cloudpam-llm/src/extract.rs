//! Generated-plan extraction.
//!
//! Scans assistant content for fenced ```json blocks and returns the first
//! one that parses as a [`GeneratedPlan`] with a non-empty `pools` array.
//! Parsing is strict and explicit: malformed model output surfaces a
//! descriptive `SchemaViolation` rather than a silent default.

use std::collections::HashSet;

use cloudpam_core::cidr::Cidr;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// A plan proposed by the model: a named batch of pools to create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedPlan {
    pub name: String,
    pub description: String,
    pub pools: Vec<GeneratedPool>,
}

/// One pool within a [`GeneratedPlan`].
///
/// `ref_` is the plan-local identifier other pools use to name it as their
/// parent (`parent_ref`); it has no relation to any store-assigned pool id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedPool {
    #[serde(rename = "ref")]
    pub ref_: String,
    pub name: String,
    pub cidr: String,
    #[serde(rename = "type")]
    pub pool_type: String,
    #[serde(default)]
    pub parent_ref: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

const VALID_TYPES: [&str; 5] = ["supernet", "region", "environment", "vpc", "subnet"];

/// Scan `content` for fenced ```json blocks and return the first one that
/// parses into a [`GeneratedPlan`] with a non-empty, well-formed `pools`
/// array. Returns [`LlmError::SchemaViolation`] if no block qualifies.
pub fn extract_plan(content: &str) -> Result<GeneratedPlan, LlmError> {
    let mut last_error: Option<String> = None;

    for block in fenced_json_blocks(content) {
        match serde_json::from_str::<GeneratedPlan>(&block) {
            Ok(plan) if !plan.pools.is_empty() => {
                validate_plan(&plan)?;
                return Ok(plan);
            }
            Ok(_) => {
                last_error = Some("plan parsed but `pools` array was empty".to_string());
            }
            Err(e) => {
                last_error = Some(e.to_string());
            }
        }
    }

    Err(LlmError::SchemaViolation(match last_error {
        Some(msg) => format!("no fenced json block yielded a valid plan: {msg}"),
        None => "no fenced json block found in assistant content".to_string(),
    }))
}

/// Validate a parsed plan's structural rules: pools must
/// be declared in topological order (parent before child), every CIDR
/// must be a valid IPv4 prefix with `8 <= prefix <= 30`, and every type
/// must be one of the five known pool types.
fn validate_plan(plan: &GeneratedPlan) -> Result<(), LlmError> {
    let mut seen: HashSet<&str> = HashSet::new();

    for pool in &plan.pools {
        if let Some(parent_ref) = pool.parent_ref.as_deref() {
            if !seen.contains(parent_ref) {
                return Err(LlmError::SchemaViolation(format!(
                    "pool {:?} references parent_ref {:?} before it is declared",
                    pool.ref_, parent_ref
                )));
            }
        }

        let cidr = Cidr::parse(&pool.cidr).map_err(|e| {
            LlmError::SchemaViolation(format!("pool {:?} has invalid cidr: {e}", pool.ref_))
        })?;
        if !(8..=30).contains(&cidr.prefix_len()) {
            return Err(LlmError::SchemaViolation(format!(
                "pool {:?} cidr {} has prefix length outside 8..=30",
                pool.ref_, pool.cidr
            )));
        }

        if !VALID_TYPES.contains(&pool.pool_type.as_str()) {
            return Err(LlmError::SchemaViolation(format!(
                "pool {:?} has unknown type {:?}",
                pool.ref_, pool.pool_type
            )));
        }

        seen.insert(pool.ref_.as_str());
    }

    Ok(())
}

/// Extract the contents of every ```json fenced block in `content`, in
/// order of appearance.
fn fenced_json_blocks(content: &str) -> Vec<String> {
    const FENCE_OPEN: &str = "```json";
    const FENCE_CLOSE: &str = "```";

    let mut blocks = Vec::new();
    let mut rest = content;

    while let Some(start) = rest.find(FENCE_OPEN) {
        let after_open = &rest[start + FENCE_OPEN.len()..];
        let Some(end) = after_open.find(FENCE_CLOSE) else {
            break;
        };
        blocks.push(after_open[..end].trim().to_string());
        rest = &after_open[end + FENCE_CLOSE.len()..];
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_PLAN: &str = r#"
Here is a plan:

```json
{
  "name": "prod rollout",
  "description": "new prod VPC",
  "pools": [
    {"ref": "vpc", "name": "prod-vpc", "cidr": "10.0.0.0/16", "type": "vpc"},
    {"ref": "subnet-a", "name": "prod-a", "cidr": "10.0.0.0/24", "type": "subnet", "parent_ref": "vpc"}
  ]
}
```

Let me know if you'd like changes.
"#;

    #[test]
    fn extracts_first_valid_block() {
        let plan = extract_plan(VALID_PLAN).unwrap();
        assert_eq!(plan.pools.len(), 2);
        assert_eq!(plan.pools[1].parent_ref.as_deref(), Some("vpc"));
    }

    #[test]
    fn rejects_parent_ref_before_declaration() {
        let content = r#"```json
{"name": "p", "description": "d", "pools": [
  {"ref": "child", "name": "c", "cidr": "10.0.0.0/24", "type": "subnet", "parent_ref": "missing"}
]}
```"#;
        let err = extract_plan(content).unwrap_err();
        assert!(matches!(err, LlmError::SchemaViolation(_)));
    }

    #[test]
    fn rejects_out_of_range_prefix() {
        let content = r#"```json
{"name": "p", "description": "d", "pools": [
  {"ref": "a", "name": "a", "cidr": "10.0.0.0/31", "type": "subnet"}
]}
```"#;
        let err = extract_plan(content).unwrap_err();
        assert!(matches!(err, LlmError::SchemaViolation(_)));
    }

    #[test]
    fn rejects_unknown_type() {
        let content = r#"```json
{"name": "p", "description": "d", "pools": [
  {"ref": "a", "name": "a", "cidr": "10.0.0.0/24", "type": "datacenter"}
]}
```"#;
        let err = extract_plan(content).unwrap_err();
        assert!(matches!(err, LlmError::SchemaViolation(_)));
    }

    #[test]
    fn skips_empty_pools_block_and_falls_through() {
        let content = r#"```json
{"name": "empty", "description": "d", "pools": []}
```
```json
{"name": "real", "description": "d", "pools": [
  {"ref": "a", "name": "a", "cidr": "10.0.0.0/24", "type": "subnet"}
]}
```"#;
        let plan = extract_plan(content).unwrap();
        assert_eq!(plan.name, "real");
    }

    #[test]
    fn errors_when_no_fenced_block_present() {
        let err = extract_plan("just some prose, no json here").unwrap_err();
        assert!(matches!(err, LlmError::SchemaViolation(_)));
    }
}
