//! Resolver registry and the staged initializer. Built-in providers (`env`,
//! `process`) are always on; at most one staged remote and one staged secret
//! provider are active at a time, last registration winning. Stages run
//! strictly sequentially because each provider's `init` may read config
//! resolved by the stages before it.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{ConfabError, ErrorMap};
use crate::provider::{Capability, ConfigView, EnvProvider, ProcessProvider, Provider};
use crate::resolve::Engine;
use crate::translate::Translator;
use crate::tree::{ConfigNode, Source, json_type_name};
use crate::{build, merge, translate};

pub(crate) struct Registry {
    builtins: Vec<Arc<dyn Provider>>,
    staged: Vec<Arc<dyn Provider>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            builtins: vec![Arc::new(EnvProvider), Arc::new(ProcessProvider)],
            staged: Vec::new(),
        }
    }

    /// Register a staged provider. Displaces any earlier provider of the
    /// same capability; built-ins are never displaced.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.staged
            .retain(|existing| existing.capability() != provider.capability());
        self.staged.push(provider);
    }

    /// Find a provider by resolver name, built-ins first.
    pub fn lookup(&self, name: &str) -> Option<&Arc<dyn Provider>> {
        self.builtins
            .iter()
            .chain(self.staged.iter())
            .find(|provider| provider.name() == name)
    }

    /// The active staged provider of a capability, if any.
    pub fn by_capability(&self, capability: Capability) -> Option<&Arc<dyn Provider>> {
        self.staged
            .iter()
            .find(|provider| provider.capability() == capability)
    }

    pub fn staged(&self) -> &[Arc<dyn Provider>] {
        &self.staged
    }

    pub fn builtin_names(&self) -> HashSet<String> {
        self.builtins
            .iter()
            .map(|provider| provider.name().to_string())
            .collect()
    }
}

/// Run staged initialization over `tree` and return the terminal tree.
///
/// Order per stage: snapshot view → `init` → translate and overlay the bulk
/// contribution (provider wins on conflicts) → re-resolve under the widened
/// whitelist. A final unrestricted pass turns placeholders whose provider
/// never registered into sticky errors.
pub(crate) async fn staged_init(
    registry: &Registry,
    translators: &[Arc<dyn Translator>],
    errors: &ErrorMap,
    mut tree: ConfigNode,
) -> Result<ConfigNode, ConfabError> {
    let engine = Engine {
        registry,
        translators,
        errors,
    };

    let mut whitelist = registry.builtin_names();
    tree = engine.resolve(tree, "", Some(&whitelist)).await;

    for provider in registry.staged() {
        let view = ConfigView::new(tree.clone());
        let bulk = provider.init(&view).await?;
        let bulk = translate::apply(translators, bulk);
        match bulk {
            Value::Null => {}
            Value::Object(_) => {
                let source = Source::new(provider.capability().source_kind(), provider.name());
                let overlay = build::create_root(&source, bulk)?;
                tree = merge::deep_merge(tree, overlay);
            }
            other => {
                return Err(ConfabError::InvalidObject {
                    key: provider.name().to_string(),
                    reason: format!(
                        "bulk contribution must be an object or null, got {}",
                        json_type_name(&other)
                    ),
                });
            }
        }
        whitelist.insert(provider.name().to_string());
        tree = engine.resolve(tree, "", Some(&whitelist)).await;
    }

    Ok(engine.resolve(tree, "", None).await)
}
