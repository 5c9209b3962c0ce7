use std::collections::BTreeMap;

use serde::Deserialize;

/// Condition type that marks a node as able to accept workload.
pub const READY_CONDITION: &str = "Ready";

/// A control-plane node and its condition name → status pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub name: String,
    pub conditions: BTreeMap<String, String>,
}

impl NodeRecord {
    pub fn is_ready(&self) -> bool {
        self.conditions
            .get(READY_CONDITION)
            .is_some_and(|status| status == "True")
    }
}

// Wire shape of `get nodes -o json`; only the fields we read.

#[derive(Debug, Deserialize)]
struct NodeListDoc {
    #[serde(default)]
    items: Vec<NodeDoc>,
}

#[derive(Debug, Deserialize)]
struct NodeDoc {
    #[serde(default)]
    metadata: NodeMetadata,
    #[serde(default)]
    status: NodeStatusDoc,
}

#[derive(Debug, Default, Deserialize)]
struct NodeMetadata {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct NodeStatusDoc {
    #[serde(default)]
    conditions: Vec<ConditionDoc>,
}

#[derive(Debug, Deserialize)]
struct ConditionDoc {
    #[serde(rename = "type")]
    kind: String,
    status: String,
}

/// Parse a node-list JSON document into records.
pub fn parse_node_list(raw: &[u8]) -> Result<Vec<NodeRecord>, serde_json::Error> {
    let doc: NodeListDoc = serde_json::from_slice(raw)?;
    Ok(doc
        .items
        .into_iter()
        .map(|item| NodeRecord {
            name: item.metadata.name,
            conditions: item
                .status
                .conditions
                .into_iter()
                .map(|c| (c.kind, c.status))
                .collect(),
        })
        .collect())
}

pub fn count_ready(nodes: &[NodeRecord]) -> usize {
    nodes.iter().filter(|n| n.is_ready()).count()
}
