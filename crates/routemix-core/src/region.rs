//! Region bucketing.
//!
//! Nodes are bucketed by the region code derived from their name, with a
//! static code→label table providing display names. Codes missing from the
//! table fall back to the raw code, so grouping has no failure mode.

use indexmap::IndexMap;

use crate::node::NodeRecord;

/// Static region-code → display-label table.
///
/// UK and GB deliberately share a label; their nodes merge into one group.
const REGION_LABELS: [(&str, &str); 13] = [
    ("HK", "香港节点"),
    ("JP", "日本节点"),
    ("SG", "新加坡节点"),
    ("US", "美国节点"),
    ("UK", "英国节点"),
    ("GB", "英国节点"),
    ("KR", "韩国节点"),
    ("TW", "台湾节点"),
    ("CN", "中国节点"),
    ("DE", "德国节点"),
    ("FR", "法国节点"),
    ("CA", "加拿大节点"),
    ("AU", "澳大利亚节点"),
];

/// A display label paired with the node names bucketed under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionGroup {
    /// Resolved display label (or raw code for unmapped regions).
    pub label: String,
    /// Node names in first-seen order.
    pub nodes: Vec<String>,
}

/// Resolves a region code to its display label, falling back to the code.
pub fn region_label(code: &str) -> &str {
    REGION_LABELS
        .iter()
        .find(|(c, _)| *c == code)
        .map_or(code, |(_, label)| *label)
}

/// Buckets nodes by resolved region label.
///
/// First-seen order is preserved both for labels and for nodes within a
/// label. Codes that resolve to the same label (UK/GB) land in one group.
/// Empty input yields an empty list.
pub fn group_by_region(nodes: &[NodeRecord]) -> Vec<RegionGroup> {
    let mut buckets: IndexMap<&str, Vec<String>> = IndexMap::new();
    for node in nodes {
        buckets
            .entry(region_label(&node.region))
            .or_default()
            .push(node.name.clone());
    }
    buckets
        .into_iter()
        .map(|(label, nodes)| RegionGroup {
            label: label.to_string(),
            nodes,
        })
        .collect()
}
