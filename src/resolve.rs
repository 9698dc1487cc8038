//! The placeholder resolution engine: walks a tree depth-first, dispatches
//! every actionable placeholder (and pending value) to its provider
//! concurrently, awaits all fetches, then substitutes the results back in a
//! deterministic document-order fold. Per-placeholder failures are contained
//! by the default/nullable/invalid policy; they never abort sibling fetches.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{BoxFuture, join_all};
use serde_json::Value;

use crate::error::{ConfabError, ErrorMap};
use crate::registry::Registry;
use crate::translate::Translator;
use crate::tree::{ConfigNode, NodeKind, PendingValue, Placeholder, Source, SourceKind};
use crate::{build, path, provider, translate};

pub(crate) struct Engine<'a> {
    pub registry: &'a Registry,
    pub translators: &'a [Arc<dyn Translator>],
    pub errors: &'a ErrorMap,
}

/// A node scheduled for substitution, with its document path.
enum Target {
    Placeholder {
        path: String,
        spec: Placeholder,
        nullable: bool,
    },
    Pending {
        path: String,
        source: Source,
        nullable: bool,
        value: PendingValue,
    },
}

impl Target {
    fn path(&self) -> &str {
        match self {
            Target::Placeholder { path, .. } | Target::Pending { path, .. } => path,
        }
    }
}

impl Engine<'_> {
    /// Resolve every placeholder whose provider is in `whitelist` (or all of
    /// them when no whitelist is given), plus every pending value. Resolving
    /// an already-resolved tree returns it unchanged.
    ///
    /// `base` is the absolute document path `tree` sits at ("" for the whole
    /// document); recorded failures always use absolute paths, even when the
    /// engine runs over a subtree.
    pub async fn resolve(
        &self,
        tree: ConfigNode,
        base: &str,
        whitelist: Option<&HashSet<String>>,
    ) -> ConfigNode {
        let mut targets = Vec::new();
        collect(&tree, "", whitelist, &mut targets);
        if targets.is_empty() {
            return tree;
        }

        let absolutes: Vec<String> = targets
            .iter()
            .map(|target| join(base, target.path()))
            .collect();
        let fetches = targets
            .iter()
            .zip(&absolutes)
            .map(|(target, absolute)| self.resolve_target(target, absolute, whitelist));
        let resolved = join_all(fetches).await;

        // Placeholders occur at disjoint paths, so the fold order only
        // matters for determinism, not for the result.
        let mut out = tree;
        for (target, node) in targets.iter().zip(resolved) {
            if target.path().is_empty() {
                out = node;
            } else {
                match path::set(&out, target.path(), node) {
                    Ok(updated) => out = updated,
                    Err(error) => {
                        tracing::warn!(path = target.path(), %error, "substitution failed")
                    }
                }
            }
        }
        out
    }

    fn resolve_subtree<'b>(
        &'b self,
        tree: ConfigNode,
        base: &'b str,
        whitelist: Option<&'b HashSet<String>>,
    ) -> BoxFuture<'b, ConfigNode> {
        Box::pin(self.resolve(tree, base, whitelist))
    }

    async fn resolve_target(
        &self,
        target: &Target,
        node_path: &str,
        whitelist: Option<&HashSet<String>>,
    ) -> ConfigNode {
        match target {
            Target::Placeholder { spec, nullable, .. } => {
                self.resolve_placeholder(node_path, spec, *nullable, whitelist)
                    .await
            }
            Target::Pending {
                source,
                nullable,
                value,
                ..
            } => {
                self.resolve_pending(node_path, source, *nullable, value, whitelist)
                    .await
            }
        }
    }

    async fn resolve_placeholder(
        &self,
        node_path: &str,
        spec: &Placeholder,
        node_nullable: bool,
        whitelist: Option<&HashSet<String>>,
    ) -> ConfigNode {
        let nullable = node_nullable || spec.is_nullable();
        let source = self.substituted_source(spec);

        let fetched = match self.registry.lookup(&spec.source) {
            Some(provider) => {
                provider
                    .get(&spec.key, spec.value_type.as_deref(), spec.alt_key.as_deref())
                    .await
            }
            None => Err(ConfabError::MissingResolver {
                resolver: spec.source.clone(),
                key: spec.key.clone(),
            }),
        };

        match fetched {
            Ok(value) => {
                self.substitute(&source, value, nullable, node_path, whitelist)
                    .await
            }
            Err(error) => {
                if let Some(default) = &spec.default {
                    tracing::warn!(
                        path = node_path,
                        %error,
                        "placeholder fetch failed; substituting declared default"
                    );
                    self.substitute(&source, default.clone(), nullable, node_path, whitelist)
                        .await
                } else if nullable {
                    tracing::warn!(
                        path = node_path,
                        %error,
                        "placeholder fetch failed; substituting null"
                    );
                    ConfigNode::null(source)
                } else {
                    self.errors.record(node_path, error);
                    ConfigNode::invalid(source)
                }
            }
        }
    }

    async fn resolve_pending(
        &self,
        node_path: &str,
        source: &Source,
        nullable: bool,
        value: &PendingValue,
        whitelist: Option<&HashSet<String>>,
    ) -> ConfigNode {
        match value.wait().await {
            Ok(value) => {
                self.substitute(source, value, nullable, node_path, whitelist)
                    .await
            }
            Err(message) => {
                let error = ConfabError::ProviderFailure {
                    provider: source.name.clone(),
                    key: source
                        .key
                        .clone()
                        .unwrap_or_else(|| node_path.to_string()),
                    message,
                };
                if nullable {
                    tracing::warn!(path = node_path, %error, "pending value failed; substituting null");
                    ConfigNode::null(source.clone())
                } else {
                    self.errors.record(node_path, error);
                    ConfigNode::invalid(source.clone())
                }
            }
        }
    }

    /// Translate a fetched value, rebuild it at the placeholder's position,
    /// and resolve any placeholders the value itself carried. `node_path` is
    /// the absolute position being substituted, so nested failures are
    /// recorded under their full document path.
    async fn substitute(
        &self,
        source: &Source,
        value: Value,
        nullable: bool,
        node_path: &str,
        whitelist: Option<&HashSet<String>>,
    ) -> ConfigNode {
        let value = translate::apply(self.translators, value);
        let node = build::build(source, value, nullable);
        if node.is_resolved() {
            node
        } else {
            self.resolve_subtree(node, node_path, whitelist).await
        }
    }

    fn substituted_source(&self, spec: &Placeholder) -> Source {
        let kind = match self.registry.lookup(&spec.source) {
            Some(p) => provider::source_kind_for(p.name(), p.capability()),
            None => SourceKind::Remote,
        };
        Source {
            kind,
            name: spec.source.clone(),
            key: Some(spec.key.clone()),
            alt_key: spec.alt_key.clone(),
        }
    }
}

/// Depth-first target discovery in document order.
fn collect(
    node: &ConfigNode,
    prefix: &str,
    whitelist: Option<&HashSet<String>>,
    out: &mut Vec<Target>,
) {
    match &node.kind {
        NodeKind::Root(entries) | NodeKind::Object(entries) => {
            for (key, child) in entries {
                collect(child, &join(prefix, key), whitelist, out);
            }
        }
        NodeKind::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                collect(child, &join(prefix, &index.to_string()), whitelist, out);
            }
        }
        NodeKind::Placeholder(spec) => {
            if whitelist.is_none_or(|w| w.contains(&spec.source)) {
                out.push(Target::Placeholder {
                    path: prefix.to_string(),
                    spec: spec.clone(),
                    nullable: node.nullable,
                });
            }
        }
        NodeKind::Pending(value) => out.push(Target::Pending {
            path: prefix.to_string(),
            source: node.source.clone(),
            nullable: node.nullable,
            value: value.clone(),
        }),
        _ => {}
    }
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else if segment.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}
