//! Typed job responses.

use serde::{Deserialize, Serialize};

/// Result of a child module import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleImportResult {
    pub module_id: String,
    pub version: u32,
    pub title: String,
}

/// Node of a collection tree, produced by a Google Doc import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionTreeNode {
    pub title: String,
    pub module_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CollectionTreeNode>,
}

impl CollectionTreeNode {
    /// A leaf pointing at one published module version.
    pub fn leaf(module: &ModuleImportResult) -> Self {
        Self {
            title: module.title.clone(),
            module_id: module.module_id.clone(),
            version: Some(module.version),
            children: Vec::new(),
        }
    }
}
