//! Compiled header rewrite rules

use serde::{Deserialize, Serialize};
use url::Url;

use crate::pattern::UrlPattern;

pub type RuleId = u32;

/// Every rule is installed at the same priority
pub const RULE_PRIORITY: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Top-level document
    MainFrame,
    /// Embedded frame
    SubFrame,
    /// Programmatic fetch
    #[serde(rename = "xmlhttprequest")]
    XmlHttpRequest,
}

impl ResourceKind {
    /// Kinds a header rule applies to
    pub const REWRITTEN: [ResourceKind; 3] = [
        ResourceKind::MainFrame,
        ResourceKind::SubFrame,
        ResourceKind::XmlHttpRequest,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderOperation {
    Set,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderOp {
    pub header: String,
    pub operation: HeaderOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl HeaderOp {
    pub fn set(header: &str, value: &str) -> Self {
        Self {
            header: header.to_string(),
            operation: HeaderOperation::Set,
            value: Some(value.to_string()),
        }
    }

    pub fn remove(header: &str) -> Self {
        Self {
            header: header.to_string(),
            operation: HeaderOperation::Remove,
            value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledRule {
    pub id: RuleId,
    pub priority: u32,
    pub domain_pattern: UrlPattern,
    pub resource_kinds: Vec<ResourceKind>,
    pub header_ops: Vec<HeaderOp>,
}

impl CompiledRule {
    pub fn matches(&self, url: &Url, kind: ResourceKind) -> bool {
        self.resource_kinds.contains(&kind) && self.domain_pattern.matches_url(url)
    }
}
