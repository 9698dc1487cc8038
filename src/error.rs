use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;
use thiserror::Error;

/// Errors are `Clone` because resolution failures are recorded in the
/// [`ErrorMap`] and replayed verbatim on every later read of the same path.
/// Wrapped io/parse/provider causes are therefore carried as messages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfabError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    // `resolver`, not `source`: thiserror treats a field named `source` as
    // the error cause.
    #[error("No resolver registered for source '{resolver}' (key '{key}')")]
    MissingResolver { resolver: String, key: String },

    #[error("Provider '{provider}' failed for key '{key}': {message}")]
    ProviderFailure {
        provider: String,
        key: String,
        message: String,
    },

    #[error("Invalid object for '{key}': {reason}")]
    InvalidObject { key: String, reason: String },

    #[error("Cannot coerce '{value}' to {requested}")]
    InvalidType { value: String, requested: String },

    #[error("No {capability} resolver is registered")]
    ResolverUnavailable { capability: &'static str },

    #[error("Root document must be an object, got {actual}")]
    RootNotObject { actual: &'static str },

    #[error("Path '{path}' does not exist in the document")]
    PathNotFound { path: String },

    #[error("Segment '{segment}' of '{path}' is not a container")]
    NotAContainer { path: String, segment: String },

    #[error("Failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Sticky record of per-path resolution failures, consulted before every
/// read. An entry matches a read of the same path, of an ancestor (the read
/// would include the broken subtree) or of a descendant (the read would
/// navigate through the broken node). Entries are cleared only by a full
/// rebuild.
#[derive(Debug, Default)]
pub struct ErrorMap {
    entries: RwLock<HashMap<String, ConfabError>>,
}

impl ErrorMap {
    pub fn record(&self, path: &str, error: ConfabError) {
        tracing::debug!(path, %error, "recording sticky resolution error");
        self.entries.write().insert(path.to_string(), error);
    }

    /// Find the recorded error covering `path`, if any.
    pub fn lookup(&self, path: &str) -> Option<ConfabError> {
        let entries = self.entries.read();
        if let Some(error) = entries.get(path) {
            return Some(error.clone());
        }
        entries
            .iter()
            .find(|(recorded, _)| {
                recorded.starts_with(&format!("{path}."))
                    || path.starts_with(&format!("{recorded}."))
            })
            .map(|(_, error)| error.clone())
    }

    /// Any recorded error, used when the whole document is read.
    pub fn any(&self) -> Option<ConfabError> {
        self.entries.read().values().next().cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Install `other`'s entries wholesale, discarding the current ones.
    /// Used by reload: the rebuild records into a fresh map, and the live
    /// map is only swapped once the rebuild has succeeded.
    pub fn replace(&self, other: ErrorMap) {
        *self.entries.write() = other.entries.into_inner();
    }
}
