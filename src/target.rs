//! Target configuration wire type
//!
//! JSON body of the assign RPC; the worker consumes most fields opaquely,
//! the dispatcher only reads `name` and `tags`.

use serde::{Deserialize, Serialize};

/// Configuration of one telemetry target
///
/// `name` is unique across the cluster and keys the target's lock.
/// `tags` is order-significant: placement affinity is a prefix match
/// against each instance's tag list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "skip-verify")]
    pub skip_verify: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub subscriptions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub outputs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "buffer-size")]
    pub buffer_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "retry-timer")]
    pub retry_timer: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
}

impl TargetConfig {
    /// Create a minimal target config with just a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Attach ordered affinity tags
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fields_are_omitted() {
        let tc = TargetConfig::named("srl1");
        let json = serde_json::to_string(&tc).unwrap();
        assert_eq!(json, r#"{"name":"srl1"}"#);
    }

    #[test]
    fn kebab_case_wire_names() {
        let tc = TargetConfig {
            name: "srl1".into(),
            skip_verify: Some(true),
            buffer_size: Some(1000),
            ..Default::default()
        };
        let json = serde_json::to_string(&tc).unwrap();
        assert!(json.contains(r#""skip-verify":true"#));
        assert!(json.contains(r#""buffer-size":1000"#));
    }
}
