//! The client: builder, document loading and merging, staged initialization,
//! snapshot reads, direct provider fetches, live watches and full reload.
//!
//! All reads are synchronous against a lock-free snapshot; the tree is
//! rebuilt off to the side (load, provider push, reload) and swapped in
//! atomically, so a reader either sees the old document or the new one,
//! never a half-updated mix.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};

use crate::error::{ConfabError, ErrorMap};
use crate::loader::{self, JsonLoader, Loader, TomlLoader};
use crate::provider::{Capability, Provider, source_kind_for};
use crate::registry::{self, Registry};
use crate::resolve::Engine;
use crate::translate::{self, Translator};
use crate::tree::{ConfigNode, Source};
use crate::watch::{Observer, WatchEvent, WatchHub};
use crate::{build, merge, path};

/// Where the raw documents come from: a config directory scanned by the
/// registered loaders, inline values, or both (inline wins).
struct DocumentSet {
    config_dir: Option<PathBuf>,
    environment: String,
    default_doc: Option<Value>,
    environment_doc: Option<Value>,
    loaders: Vec<Box<dyn Loader>>,
}

impl DocumentSet {
    fn raw_default(&self) -> Result<Value, ConfabError> {
        if let Some(doc) = &self.default_doc {
            return Ok(doc.clone());
        }
        let loaded = match &self.config_dir {
            Some(dir) => loader::load_document(dir, "default", &self.loaders)?,
            None => None,
        };
        Ok(loaded.unwrap_or_else(|| Value::Object(serde_json::Map::new())))
    }

    fn raw_environment(&self) -> Result<Option<Value>, ConfabError> {
        if let Some(doc) = &self.environment_doc {
            return Ok(Some(doc.clone()));
        }
        if self.environment == "default" {
            return Ok(None);
        }
        match &self.config_dir {
            Some(dir) => loader::load_document(dir, &self.environment, &self.loaders),
            None => Ok(None),
        }
    }
}

/// Load the documents, merge them (environment wins), and run staged
/// initialization to the terminal tree.
async fn build_tree(
    docs: &DocumentSet,
    registry: &Registry,
    translators: &[Arc<dyn Translator>],
    errors: &ErrorMap,
) -> Result<ConfigNode, ConfabError> {
    let raw = translate::apply(translators, docs.raw_default()?);
    let mut tree = build::create_root(&Source::local("default"), raw)?;

    if let Some(raw) = docs.raw_environment()? {
        let raw = translate::apply(translators, raw);
        let overlay = build::create_root(&Source::local(&docs.environment), raw)?;
        tree = merge::deep_merge(tree, overlay);
    }

    registry::staged_init(registry, translators, errors, tree).await
}

struct Inner {
    snapshot: ArcSwap<ConfigNode>,
    errors: ErrorMap,
    registry: Registry,
    translators: Vec<Arc<dyn Translator>>,
    watches: WatchHub,
    docs: DocumentSet,
    // serializes snapshot rebuilds (provider pushes, direct fetches, reload)
    rebuild: Mutex<()>,
}

impl Inner {
    fn engine(&self) -> Engine<'_> {
        Engine {
            registry: &self.registry,
            translators: &self.translators,
            errors: &self.errors,
        }
    }

    /// Fold a provider-pushed value for a watched key into the snapshot and
    /// notify observers.
    async fn apply_push(&self, key: &str, pushed: Value) {
        let value = translate::apply(&self.translators, pushed);
        let _guard = self.rebuild.lock().await;
        let snapshot = self.snapshot.load_full();

        let Some(old) = path::get(&snapshot, key) else {
            tracing::warn!(key, "watched key vanished from the document; dropping update");
            return;
        };
        let (source, nullable, old_kind) = (old.source.clone(), old.nullable, old.kind_name());

        let node = build::build(&source, value, nullable);
        let node = if node.is_resolved() {
            node
        } else {
            self.engine().resolve(node, key, None).await
        };
        if node.kind_name() != old_kind {
            tracing::warn!(
                key,
                was = old_kind,
                now = node.kind_name(),
                "watched value changed type"
            );
        }

        let updated = path::read(&node);
        match path::set(&snapshot, key, node) {
            Ok(tree) => {
                self.snapshot.store(Arc::new(tree));
                self.watches.publish(key, WatchEvent::Value(updated));
            }
            Err(error) => {
                tracing::warn!(key, %error, "could not splice watched update");
                self.watches.publish(key, WatchEvent::Error(error));
            }
        }
    }
}

/// Handle on a loaded configuration. Cheap to clone; all clones share the
/// same snapshot, error map and watch channels.
#[derive(Clone)]
pub struct Confab {
    inner: Arc<Inner>,
}

impl Confab {
    pub fn builder() -> ConfabBuilder {
        ConfabBuilder::new()
    }

    /// Read the value at a dotted path.
    ///
    /// A path covered by a recorded resolution failure replays that failure;
    /// a path the document does not have is `KeyNotFound`.
    pub fn get(&self, key: &str) -> Result<Value, ConfabError> {
        if let Some(error) = self.inner.errors.lookup(key) {
            return Err(error);
        }
        let snapshot = self.inner.snapshot.load();
        path::get(&snapshot, key)
            .map(path::read)
            .ok_or_else(|| ConfabError::KeyNotFound(key.to_string()))
    }

    pub fn get_all(&self, keys: &[&str]) -> Vec<Result<Value, ConfabError>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Like [`get`](Self::get), but absence and failure both yield `default`.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// The whole document as plain data. Refused while any resolution
    /// failure is on record, since the result would silently hide it.
    pub fn document(&self) -> Result<Value, ConfabError> {
        if let Some(error) = self.inner.errors.any() {
            return Err(error);
        }
        Ok(path::read(&self.inner.snapshot.load()))
    }

    /// Provenance of the value at a dotted path.
    pub fn source(&self, key: &str) -> Result<Source, ConfabError> {
        let snapshot = self.inner.snapshot.load();
        path::get(&snapshot, key)
            .map(|node| node.source.clone())
            .ok_or_else(|| ConfabError::KeyNotFound(key.to_string()))
    }

    /// Fetch a key directly from the active remote provider, bypassing the
    /// document. The result lands in the snapshot when the document has a
    /// matching path.
    pub async fn remote_value(
        &self,
        key: &str,
        value_type: Option<&str>,
    ) -> Result<Value, ConfabError> {
        self.direct_fetch(Capability::Remote, key, value_type).await
    }

    /// Fetch a key directly from the active secret provider.
    pub async fn secret_value(
        &self,
        key: &str,
        value_type: Option<&str>,
    ) -> Result<Value, ConfabError> {
        self.direct_fetch(Capability::Secret, key, value_type).await
    }

    async fn direct_fetch(
        &self,
        capability: Capability,
        key: &str,
        value_type: Option<&str>,
    ) -> Result<Value, ConfabError> {
        let inner = &self.inner;
        let provider = inner.registry.by_capability(capability).ok_or(
            ConfabError::ResolverUnavailable {
                capability: capability.as_str(),
            },
        )?;
        let fetched = provider.get(key, value_type, None).await?;
        let fetched = translate::apply(&inner.translators, fetched);

        let source =
            Source::new(source_kind_for(provider.name(), capability), provider.name())
                .with_key(key);
        let node = build::build(&source, fetched, false);
        let node = if node.is_resolved() {
            node
        } else {
            inner.engine().resolve(node, key, None).await
        };
        let value = path::read(&node);

        // keep the snapshot current when the document carries this path
        let _guard = inner.rebuild.lock().await;
        let snapshot = inner.snapshot.load_full();
        match path::set(&snapshot, key, node) {
            Ok(tree) => inner.snapshot.store(Arc::new(tree)),
            Err(ConfabError::PathNotFound { .. }) => {}
            Err(error) => {
                tracing::warn!(key, %error, "could not splice directly fetched value")
            }
        }
        Ok(value)
    }

    /// Observe a dotted path. The first event is the current value (or the
    /// current failure); later events arrive when the backing provider
    /// pushes a change. Keys whose source cannot push changes deliver the
    /// initial event only.
    pub fn watch(&self, key: &str) -> Observer {
        // the seed is read inside the hub lock: a push landing during
        // subscription is either in the seed or delivered as an event
        let (observer, first) = self.inner.watches.subscribe(key, || match self.get(key) {
            Ok(value) => WatchEvent::Value(value),
            Err(error) => WatchEvent::Error(error),
        });
        if first {
            self.hook_provider_watch(key);
        }
        observer
    }

    fn hook_provider_watch(&self, key: &str) {
        let snapshot = self.inner.snapshot.load();
        let Some(node) = path::get(&snapshot, key) else {
            tracing::debug!(key, "watched key is not in the document; no provider hook");
            return;
        };
        let source = node.source.clone();
        let provider = match self.inner.registry.lookup(&source.name) {
            Some(provider) if provider.supports_watch() => Arc::clone(provider),
            _ => {
                tracing::debug!(
                    key,
                    source = %source.name,
                    "source is static; watch delivers the initial value only"
                );
                return;
            }
        };

        let provider_key = source.key.clone().unwrap_or_else(|| key.to_string());
        let (tx, mut rx) = mpsc::unbounded_channel();
        provider.watch(&provider_key, tx, None, source.alt_key.as_deref());

        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        tokio::spawn(async move {
            while let Some(value) = rx.recv().await {
                inner.apply_push(&key, value).await;
            }
        });
    }

    /// Reload the documents and re-run staged initialization from scratch.
    /// This is the only operation that clears recorded resolution failures.
    ///
    /// The rebuild records into a fresh error map; the live snapshot and
    /// error map are replaced only when it succeeds, so a failed reload
    /// leaves the previous state fully intact.
    pub async fn reload(&self) -> Result<(), ConfabError> {
        let inner = &self.inner;
        let _guard = inner.rebuild.lock().await;
        let fresh = ErrorMap::default();
        let tree =
            build_tree(&inner.docs, &inner.registry, &inner.translators, &fresh).await?;
        inner.snapshot.store(Arc::new(tree));
        inner.errors.replace(fresh);
        Ok(())
    }
}

/// Builder for [`Confab`]. Configure documents, loaders, translators and
/// providers, then [`load`](Self::load).
pub struct ConfabBuilder {
    environment: String,
    config_dir: Option<PathBuf>,
    default_document: Option<Value>,
    environment_document: Option<Value>,
    loaders: Vec<Box<dyn Loader>>,
    translators: Vec<Arc<dyn Translator>>,
    registry: Registry,
}

impl ConfabBuilder {
    fn new() -> Self {
        Self {
            environment: "default".to_string(),
            config_dir: None,
            default_document: None,
            environment_document: None,
            loaders: Vec::new(),
            translators: Vec::new(),
            registry: Registry::new(),
        }
    }

    /// Deployment environment name; selects the overlay document.
    pub fn environment(mut self, name: &str) -> Self {
        self.environment = name.to_string();
        self
    }

    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// Inline default document, used instead of reading `default.*` from the
    /// config directory.
    pub fn default_document(mut self, doc: Value) -> Self {
        self.default_document = Some(doc);
        self
    }

    /// Inline environment overlay document.
    pub fn environment_document(mut self, doc: Value) -> Self {
        self.environment_document = Some(doc);
        self
    }

    /// Register a custom loader; custom loaders take precedence over the
    /// built-in JSON and TOML loaders.
    pub fn loader(mut self, loader: Box<dyn Loader>) -> Self {
        self.loaders.push(loader);
        self
    }

    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translators.push(translator);
        self
    }

    /// Register a staged provider. A later registration of the same
    /// capability displaces the earlier one.
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.registry.register(provider);
        self
    }

    /// Load the documents, run staged initialization and return a client
    /// with the terminal tree installed.
    pub async fn load(mut self) -> Result<Confab, ConfabError> {
        self.loaders.push(Box::new(JsonLoader));
        self.loaders.push(Box::new(TomlLoader));

        let docs = DocumentSet {
            config_dir: self.config_dir,
            environment: self.environment,
            default_doc: self.default_document,
            environment_doc: self.environment_document,
            loaders: self.loaders,
        };
        let errors = ErrorMap::default();
        let tree = build_tree(&docs, &self.registry, &self.translators, &errors).await?;

        Ok(Confab {
            inner: Arc::new(Inner {
                snapshot: ArcSwap::from_pointee(tree),
                errors,
                registry: self.registry,
                translators: self.translators,
                watches: WatchHub::default(),
                docs,
                rebuild: Mutex::new(()),
            }),
        })
    }
}
