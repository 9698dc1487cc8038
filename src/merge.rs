use std::collections::BTreeMap;

use crate::tree::{ConfigNode, NodeKind};

/// Deep-merge `overlay` on top of `base`.
/// If both sides are containers for the same key, recurse.
/// Otherwise, `overlay`'s node wins — including its provenance.
pub fn deep_merge(base: ConfigNode, overlay: ConfigNode) -> ConfigNode {
    let ConfigNode {
        source,
        nullable,
        kind,
    } = base;
    match (kind, overlay) {
        (
            NodeKind::Root(base_entries),
            ConfigNode {
                kind: NodeKind::Root(overlay_entries) | NodeKind::Object(overlay_entries),
                ..
            },
        ) => ConfigNode::new(
            source,
            nullable,
            NodeKind::Root(merge_entries(base_entries, overlay_entries)),
        ),
        (
            NodeKind::Object(base_entries),
            ConfigNode {
                kind: NodeKind::Object(overlay_entries),
                ..
            },
        ) => ConfigNode::new(
            source,
            nullable,
            NodeKind::Object(merge_entries(base_entries, overlay_entries)),
        ),
        (_, overlay) => overlay,
    }
}

fn merge_entries(
    mut base: BTreeMap<String, ConfigNode>,
    overlay: BTreeMap<String, ConfigNode>,
) -> BTreeMap<String, ConfigNode> {
    for (key, overlay_node) in overlay {
        match base.remove(&key) {
            Some(base_node) => {
                base.insert(key, deep_merge(base_node, overlay_node));
            }
            None => {
                base.insert(key, overlay_node);
            }
        }
    }
    base
}
