//! Dotted-path navigation over the value tree. `a.b.c` addresses nested
//! object entries; a purely numeric segment addresses an array element.
//! Reads treat absence as a normal outcome; writes are copy-on-write and may
//! only replace nodes the document already has.

use serde_json::Value;

use crate::error::ConfabError;
use crate::tree::{ConfigNode, NodeKind};

/// Look up the node at `path`. Returns `None` if any segment is missing or
/// navigation hits a non-container before the path is exhausted.
pub fn get<'a>(tree: &'a ConfigNode, path: &str) -> Option<&'a ConfigNode> {
    let mut current = tree;
    for segment in path.split('.') {
        current = match &current.kind {
            NodeKind::Root(entries) | NodeKind::Object(entries) => entries.get(segment)?,
            NodeKind::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Return a new tree with the node at `path` replaced by `value`.
///
/// Ancestors along the path are rebuilt; siblings are reused unchanged. The
/// target must already exist — the document's shape is fixed at load time,
/// so `set` replaces but never inserts.
pub fn set(tree: &ConfigNode, path: &str, value: ConfigNode) -> Result<ConfigNode, ConfabError> {
    let segments: Vec<&str> = path.split('.').collect();
    set_at(tree, path, &segments, value)
}

fn set_at(
    node: &ConfigNode,
    path: &str,
    segments: &[&str],
    value: ConfigNode,
) -> Result<ConfigNode, ConfabError> {
    let segment = segments[0];
    match &node.kind {
        NodeKind::Root(entries) | NodeKind::Object(entries) => {
            let child = entries.get(segment).ok_or_else(|| ConfabError::PathNotFound {
                path: path.to_string(),
            })?;
            let replacement = if segments.len() == 1 {
                value
            } else {
                set_at(child, path, &segments[1..], value)?
            };
            let mut entries = entries.clone();
            entries.insert(segment.to_string(), replacement);
            let kind = match &node.kind {
                NodeKind::Root(_) => NodeKind::Root(entries),
                _ => NodeKind::Object(entries),
            };
            Ok(ConfigNode::new(node.source.clone(), node.nullable, kind))
        }
        NodeKind::Array(items) => {
            let index: usize = segment.parse().map_err(|_| ConfabError::NotAContainer {
                path: path.to_string(),
                segment: segment.to_string(),
            })?;
            let child = items.get(index).ok_or_else(|| ConfabError::PathNotFound {
                path: path.to_string(),
            })?;
            let replacement = if segments.len() == 1 {
                value
            } else {
                set_at(child, path, &segments[1..], value)?
            };
            let mut items = items.clone();
            items[index] = replacement;
            Ok(ConfigNode::new(
                node.source.clone(),
                node.nullable,
                NodeKind::Array(items),
            ))
        }
        _ => Err(ConfabError::NotAContainer {
            path: path.to_string(),
            segment: segment.to_string(),
        }),
    }
}

/// Materialize a subtree into plain data for consumer use.
///
/// Reading a placeholder or pending node is a caller contract violation
/// (resolution must run first): it logs a warning and yields `null`.
pub fn read(node: &ConfigNode) -> Value {
    match &node.kind {
        NodeKind::Root(entries) | NodeKind::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, child)| (key.clone(), read(child)))
                .collect(),
        ),
        NodeKind::Array(items) => Value::Array(items.iter().map(read).collect()),
        NodeKind::String(s) => Value::String(s.clone()),
        NodeKind::Number(n) => Value::Number(n.clone()),
        NodeKind::Bool(b) => Value::Bool(*b),
        NodeKind::Null | NodeKind::Invalid => Value::Null,
        NodeKind::Placeholder(ph) => {
            tracing::warn!(
                source = %ph.source,
                key = %ph.key,
                "reading an unresolved placeholder; run resolution first"
            );
            Value::Null
        }
        NodeKind::Pending(_) => {
            tracing::warn!("reading a value that is still pending; run resolution first");
            Value::Null
        }
    }
}
