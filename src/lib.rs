//! Runtime configuration with pluggable remote and secret backends. Point at
//! your documents, register providers, and read.
//!
//! Confab loads layered configuration documents, resolves embedded references
//! to external systems (key-value stores, secret managers, environment
//! variables, process metadata) and hands out plain values from a consistent
//! in-memory snapshot.
//!
//! ```ignore
//! let config = Confab::builder()
//!     .config_dir("/etc/myapp")
//!     .environment("production")
//!     .provider(Arc::new(consul))
//!     .provider(Arc::new(vault))
//!     .load()
//!     .await?;
//!
//! let port = config.get("server.port")?;
//! ```
//!
//! That single call reads `default.*` and `production.*` from the config
//! directory, deep-merges them (environment wins key-by-key), resolves every
//! placeholder against its provider, and returns a client whose reads are
//! synchronous and lock-free.
//!
//! # Placeholders
//!
//! A document references an external value with a marker object:
//!
//! ```json
//! { "db": { "password": { "source": "vault", "key": "db/password" } } }
//! ```
//!
//! An object is a marker iff it has exactly the marker fields, `source` and
//! `key` required; anything else — an extra field, a wrong type — makes it
//! ordinary data. Optional marker fields:
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `altKey` | fallback key tried when `key` is absent |
//! | `type` | requested coercion: `string`, `number`, `boolean`, `json` |
//! | `default` | substituted when the fetch fails |
//! | `nullable` | a failed fetch becomes `null` instead of an error |
//!
//! On failure the fallback order is fixed: declared `default` first, then
//! `null` if nullable, otherwise the path is marked invalid and the failure
//! is recorded. A recorded failure is **sticky** — every later read of that
//! path (or of an ancestor or descendant) replays the same error without
//! touching the provider again. Only [`reload`](Confab::reload) clears it.
//!
//! Fetched values are recursive: a provider may return a document that itself
//! carries markers, and those resolve in the same pass. Failures are
//! contained to their own path; sibling fetches proceed regardless.
//!
//! # Providers and staged initialization
//!
//! A [`Provider`] serves one [`Capability`] — `Remote` (key-value store) or
//! `Secret` (secret manager) — and at most one staged provider per capability
//! is active, last registration winning. Two built-ins are always on: `env`
//! (environment variables, with heuristic bool/int/float parsing) and
//! `process` (`pid`, `cwd`, `args`, `exe`).
//!
//! Providers initialize **in registration order**, and each stage may read
//! configuration the earlier stages produced: a secret manager can find its
//! own address in a value the remote store contributed. A stage may also
//! return a bulk document that is overlaid onto the tree (provider wins on
//! conflicts) before the next stage runs.
//!
//! # Watches
//!
//! [`watch`](Confab::watch) observes a dotted path. The first event is the
//! current value; later events arrive when the backing provider pushes a
//! change, each pushed value re-resolved and spliced into the snapshot before
//! observers are notified. Keys whose source cannot push changes deliver the
//! initial event only.
//!
//! # Concurrency model
//!
//! Reads never block: they load the current snapshot atomically and navigate
//! it. Within one resolution pass all provider fetches are dispatched
//! concurrently and substituted in deterministic document order, so two runs
//! over the same inputs produce identical trees. Rebuilds (pushes, direct
//! fetches, reload) are serialized and each installs a complete new snapshot;
//! a clone of the client obtained before a swap keeps reading the old tree
//! consistently.
//!
//! # Error handling
//!
//! All fallible operations return [`ConfabError`]. Reads distinguish absence
//! (`KeyNotFound`) from recorded resolution failures, which carry the
//! original provider error. Reading the whole document is refused while any
//! failure is on record.

pub mod error;

mod build;
mod client;
mod loader;
mod merge;
mod path;
mod provider;
mod registry;
mod resolve;
mod translate;
mod tree;
mod watch;

#[cfg(test)]
mod fixtures;

pub use client::{Confab, ConfabBuilder};
pub use error::{ConfabError, ErrorMap};
pub use loader::{JsonLoader, Loader, TomlLoader};
pub use provider::{
    Capability, ConfigView, EnvProvider, ProcessProvider, Provider, WatchSender, coerce,
};
pub use translate::Translator;
pub use tree::{ConfigNode, NodeKind, PendingValue, Placeholder, Source, SourceKind};
pub use watch::{Observer, WatchEvent};
