//! Raw data → value tree. Dispatches on the shape of a `serde_json::Value`
//! exactly once: placeholder markers become `Placeholder` nodes, containers
//! recurse, primitives map to their matching variants.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ConfabError;
use crate::tree::{ConfigNode, NodeKind, Placeholder, Source, json_type_name};

/// Build a node from raw data.
///
/// Children of containers inherit the source's kind and name but not its
/// key/altKey — those belong to the node a fetch was substituted at.
pub fn build(source: &Source, raw: Value, nullable: bool) -> ConfigNode {
    let kind = match raw {
        Value::Object(map) => match Placeholder::from_marker(&map) {
            Some(placeholder) => NodeKind::Placeholder(placeholder),
            None => NodeKind::Object(build_entries(source, map, nullable)),
        },
        Value::Array(items) => {
            let child_source = source.stripped();
            NodeKind::Array(
                items
                    .into_iter()
                    .map(|item| build(&child_source, item, nullable))
                    .collect(),
            )
        }
        Value::String(s) => NodeKind::String(s),
        Value::Number(n) => NodeKind::Number(n),
        Value::Bool(b) => NodeKind::Bool(b),
        Value::Null => NodeKind::Null,
    };
    ConfigNode::new(source.clone(), nullable, kind)
}

/// Build a top-level document. The raw value must be an object.
pub fn create_root(source: &Source, raw: Value) -> Result<ConfigNode, ConfabError> {
    match raw {
        Value::Object(map) => Ok(ConfigNode::new(
            source.clone(),
            false,
            NodeKind::Root(build_entries(source, map, false)),
        )),
        other => Err(ConfabError::RootNotObject {
            actual: json_type_name(&other),
        }),
    }
}

fn build_entries(
    source: &Source,
    map: serde_json::Map<String, Value>,
    nullable: bool,
) -> BTreeMap<String, ConfigNode> {
    let child_source = source.stripped();
    map.into_iter()
        .map(|(key, value)| (key, build(&child_source, value, nullable)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::SourceKind;
    use serde_json::json;

    fn local() -> Source {
        Source::local("default")
    }

    #[test]
    fn primitives_map_to_matching_kinds() {
        assert!(matches!(
            build(&local(), json!("x"), false).kind,
            NodeKind::String(_)
        ));
        assert!(matches!(
            build(&local(), json!(8080), false).kind,
            NodeKind::Number(_)
        ));
        assert!(matches!(
            build(&local(), json!(true), false).kind,
            NodeKind::Bool(true)
        ));
        assert!(matches!(build(&local(), json!(null), false).kind, NodeKind::Null));
    }

    #[test]
    fn object_recurses_per_property() {
        let node = build(&local(), json!({"server": {"port": 8000}}), false);
        let entries = match &node.kind {
            NodeKind::Object(entries) => entries,
            other => panic!("expected object, got {other:?}"),
        };
        let server = entries.get("server").unwrap();
        assert!(matches!(server.kind, NodeKind::Object(_)));
    }

    #[test]
    fn array_recurses_per_element() {
        let node = build(&local(), json!([1, "two", null]), false);
        let items = match &node.kind {
            NodeKind::Array(items) => items,
            other => panic!("expected array, got {other:?}"),
        };
        assert_eq!(items.len(), 3);
        assert!(matches!(items[2].kind, NodeKind::Null));
    }

    #[test]
    fn marker_becomes_placeholder() {
        let node = build(
            &local(),
            json!({"source": "env", "key": "HOME", "default": "/root"}),
            false,
        );
        let ph = match &node.kind {
            NodeKind::Placeholder(ph) => ph,
            other => panic!("expected placeholder, got {other:?}"),
        };
        assert_eq!(ph.source, "env");
        assert_eq!(ph.default, Some(json!("/root")));
    }

    #[test]
    fn nested_marker_detected_inside_object() {
        let node = build(
            &local(),
            json!({"db": {"password": {"source": "vault", "key": "db/password"}}}),
            false,
        );
        assert!(!node.is_resolved());
    }

    #[test]
    fn children_inherit_stripped_source() {
        let source = Source::new(SourceKind::Remote, "consul").with_key("bundle");
        let node = build(&source, json!({"inner": [1]}), false);
        let entries = node.entries().unwrap();
        let inner = entries.get("inner").unwrap();
        assert_eq!(inner.source.name, "consul");
        assert!(inner.source.key.is_none());
        assert_eq!(node.source.key.as_deref(), Some("bundle"));
    }

    #[test]
    fn nullable_propagates_to_children() {
        let node = build(&local(), json!({"a": {"b": 1}}), true);
        let a = node.entries().unwrap().get("a").unwrap();
        assert!(a.nullable);
        assert!(a.entries().unwrap().get("b").unwrap().nullable);
    }

    #[test]
    fn create_root_requires_object() {
        assert!(create_root(&local(), json!({"ok": 1})).is_ok());
        let err = create_root(&local(), json!([1, 2])).unwrap_err();
        assert!(matches!(err, ConfabError::RootNotObject { actual: "array" }));
    }

    #[test]
    fn root_kind_is_root_not_object() {
        let root = create_root(&local(), json!({"a": 1})).unwrap();
        assert!(matches!(root.kind, NodeKind::Root(_)));
    }
}
