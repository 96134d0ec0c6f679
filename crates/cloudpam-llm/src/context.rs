//! Pool context builder for planning conversations.
//!
//! Assembles a summary of existing pools into a structured context block
//! prepended to the system prompt, so the model proposes plans aware of
//! what is already allocated. `cloudpam-llm` depends only on
//! `cloudpam-core`, so the caller (which holds the `cloudpam-store` /
//! `cloudpam-analysis` handles) flattens whatever it needs into
//! [`ContextPool`] before calling in.

use serde::{Deserialize, Serialize};

/// One pool's worth of context handed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPool {
    pub name: String,
    pub cidr: String,
    pub pool_type: String,
    /// Percent utilized, if known (omitted for pools with no children).
    pub utilization_percent: Option<f64>,
}

/// Build a structured context block from existing pools.
///
/// Returns an XML-style block that can be prepended to the system prompt.
/// If `pools` is empty, returns an empty string (no context to inject).
pub fn build_context_block(pools: &[ContextPool]) -> String {
    if pools.is_empty() {
        return String::new();
    }

    let mut block = String::from("<pool_context>\n");

    for pool in pools {
        block.push_str(&format!(
            "<pool name=\"{}\" cidr=\"{}\" type=\"{}\"",
            pool.name, pool.cidr, pool.pool_type
        ));
        match pool.utilization_percent {
            Some(pct) => block.push_str(&format!(" utilization=\"{pct:.1}\"/>\n")),
            None => block.push_str("/>\n"),
        }
    }

    block.push_str("</pool_context>");
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pools_produce_empty_block() {
        assert_eq!(build_context_block(&[]), "");
    }

    #[test]
    fn block_wraps_every_pool() {
        let pools = vec![
            ContextPool {
                name: "prod".into(),
                cidr: "10.0.0.0/16".into(),
                pool_type: "environment".into(),
                utilization_percent: Some(42.5),
            },
            ContextPool {
                name: "staging".into(),
                cidr: "10.1.0.0/16".into(),
                pool_type: "environment".into(),
                utilization_percent: None,
            },
        ];
        let block = build_context_block(&pools);
        assert!(block.starts_with("<pool_context>\n"));
        assert!(block.ends_with("</pool_context>"));
        assert!(block.contains("utilization=\"42.5\""));
        assert!(block.contains("name=\"staging\""));
    }
}
