//! The configuration value tree: every resolved or unresolved value is a
//! [`ConfigNode`] carrying its provenance ([`Source`]), its nullability and a
//! tagged payload ([`NodeKind`]). Nodes are logically immutable; updates go
//! through copy-on-write replacement in [`crate::path`].

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Local,
    Remote,
    Secret,
    Env,
    Process,
}

/// Provenance of a node: the kind of backing store, the document or provider
/// name, and (for substituted placeholders) the key it was fetched under.
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub kind: SourceKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_key: Option<String>,
}

impl Source {
    pub fn new(kind: SourceKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            key: None,
            alt_key: None,
        }
    }

    /// A local document source (the default/environment files).
    pub fn local(name: &str) -> Self {
        Self::new(SourceKind::Local, name)
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    /// Same backing store, without the fetched-key part. Children of a
    /// container inherit this: the key belongs to the substituted node only.
    pub fn stripped(&self) -> Self {
        Self::new(self.kind, &self.name)
    }
}

/// An unresolved reference to a named provider and key.
///
/// This doubles as the marker schema: a raw object is a placeholder iff it
/// deserializes into exactly this shape (`source` and `key` required, no
/// unknown fields). The check lives here so "looks like a placeholder" is
/// defined once, not duck-typed at every call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Placeholder {
    pub source: String,
    pub key: String,
    #[serde(default, rename = "altKey", skip_serializing_if = "Option::is_none")]
    pub alt_key: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
}

impl Placeholder {
    /// Centralized placeholder shape check over a raw object.
    pub fn from_marker(map: &serde_json::Map<String, Value>) -> Option<Self> {
        if !map.contains_key("source") || !map.contains_key("key") {
            return None;
        }
        serde_json::from_value(Value::Object(map.clone())).ok()
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable.unwrap_or(false)
    }
}

/// An in-flight asynchronous value not yet materialized. Cheaply cloneable so
/// a tree holding one can still be snapshotted; awaiting it twice yields the
/// same result.
#[derive(Clone)]
pub struct PendingValue {
    future: Shared<BoxFuture<'static, Result<Value, String>>>,
}

impl PendingValue {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Self {
            future: future.boxed().shared(),
        }
    }

    pub async fn wait(&self) -> Result<Value, String> {
        self.future.clone().await
    }
}

impl fmt::Debug for PendingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PendingValue(<in-flight>)")
    }
}

// Two pending values are never observably equal.
impl PartialEq for PendingValue {
    fn eq(&self, _other: &Self) -> bool {
        false
    }
}

/// The tagged payload of a node. `Root` is structurally an object but is the
/// only variant allowed to be the whole document.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root(BTreeMap<String, ConfigNode>),
    Object(BTreeMap<String, ConfigNode>),
    Array(Vec<ConfigNode>),
    String(String),
    Number(serde_json::Number),
    Bool(bool),
    Null,
    /// The `promise` variant: a value still being produced.
    Pending(PendingValue),
    Placeholder(Placeholder),
    /// Terminal error marker; the matching error lives in the
    /// [`ErrorMap`](crate::error::ErrorMap).
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigNode {
    pub source: Source,
    pub nullable: bool,
    pub kind: NodeKind,
}

impl ConfigNode {
    pub fn new(source: Source, nullable: bool, kind: NodeKind) -> Self {
        Self {
            source,
            nullable,
            kind,
        }
    }

    pub fn null(source: Source) -> Self {
        Self::new(source, true, NodeKind::Null)
    }

    pub fn invalid(source: Source) -> Self {
        Self::new(source, false, NodeKind::Invalid)
    }

    pub fn pending<F>(source: Source, nullable: bool, future: F) -> Self
    where
        F: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Self::new(source, nullable, NodeKind::Pending(PendingValue::new(future)))
    }

    /// Entries of a `Root` or `Object` node.
    pub fn entries(&self) -> Option<&BTreeMap<String, ConfigNode>> {
        match &self.kind {
            NodeKind::Root(entries) | NodeKind::Object(entries) => Some(entries),
            _ => None,
        }
    }

    /// A tree is resolved iff no reachable node is a placeholder or a
    /// pending value.
    pub fn is_resolved(&self) -> bool {
        match &self.kind {
            NodeKind::Placeholder(_) | NodeKind::Pending(_) => false,
            NodeKind::Root(entries) | NodeKind::Object(entries) => {
                entries.values().all(ConfigNode::is_resolved)
            }
            NodeKind::Array(items) => items.iter().all(ConfigNode::is_resolved),
            _ => true,
        }
    }

    /// Variant name, for type-drift warnings and error messages.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Root(_) => "root",
            NodeKind::Object(_) => "object",
            NodeKind::Array(_) => "array",
            NodeKind::String(_) => "string",
            NodeKind::Number(_) => "number",
            NodeKind::Bool(_) => "boolean",
            NodeKind::Null => "null",
            NodeKind::Pending(_) => "promise",
            NodeKind::Placeholder(_) => "placeholder",
            NodeKind::Invalid => "invalid",
        }
    }
}

/// Variant name of a raw JSON value, for error messages.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn marker(value: Value) -> Option<Placeholder> {
        match value {
            Value::Object(map) => Placeholder::from_marker(&map),
            _ => None,
        }
    }

    #[test]
    fn marker_with_source_and_key_matches() {
        let ph = marker(json!({"source": "vault", "key": "db/password"})).unwrap();
        assert_eq!(ph.source, "vault");
        assert_eq!(ph.key, "db/password");
        assert!(!ph.is_nullable());
    }

    #[test]
    fn marker_with_all_fields_matches() {
        let ph = marker(json!({
            "source": "consul",
            "key": "feature",
            "altKey": "feature_fallback",
            "type": "boolean",
            "default": false,
            "nullable": true,
        }))
        .unwrap();
        assert_eq!(ph.alt_key.as_deref(), Some("feature_fallback"));
        assert_eq!(ph.value_type.as_deref(), Some("boolean"));
        assert_eq!(ph.default, Some(json!(false)));
        assert!(ph.is_nullable());
    }

    #[test]
    fn plain_object_is_not_a_marker() {
        assert!(marker(json!({"host": "localhost", "port": 8080})).is_none());
    }

    #[test]
    fn marker_with_extra_fields_is_plain_object() {
        assert!(marker(json!({"source": "env", "key": "HOME", "extra": 1})).is_none());
    }

    #[test]
    fn marker_with_wrong_field_type_is_plain_object() {
        assert!(marker(json!({"source": 42, "key": "HOME"})).is_none());
    }

    #[test]
    fn stripped_source_drops_keys() {
        let source = Source::new(SourceKind::Remote, "consul").with_key("db/host");
        let stripped = source.stripped();
        assert_eq!(stripped.name, "consul");
        assert_eq!(stripped.kind, SourceKind::Remote);
        assert!(stripped.key.is_none());
    }

    #[test]
    fn pending_values_never_compare_equal() {
        let a = PendingValue::new(async { Ok(json!(1)) });
        let b = a.clone();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn pending_value_shares_its_result() {
        let pending = PendingValue::new(async { Ok(json!("done")) });
        let again = pending.clone();
        assert_eq!(pending.wait().await, Ok(json!("done")));
        assert_eq!(again.wait().await, Ok(json!("done")));
    }

    #[test]
    fn resolved_walks_containers() {
        let source = Source::local("default");
        let leaf = ConfigNode::new(source.clone(), false, NodeKind::Bool(true));
        let ph = ConfigNode::new(
            source.clone(),
            false,
            NodeKind::Placeholder(Placeholder {
                source: "env".into(),
                key: "HOME".into(),
                alt_key: None,
                value_type: None,
                default: None,
                nullable: None,
            }),
        );
        let mut entries = BTreeMap::new();
        entries.insert("ok".to_string(), leaf);
        let resolved = ConfigNode::new(source.clone(), false, NodeKind::Root(entries.clone()));
        assert!(resolved.is_resolved());

        entries.insert("pending".to_string(), ph);
        let unresolved = ConfigNode::new(source, false, NodeKind::Root(entries));
        assert!(!unresolved.is_resolved());
    }
}
