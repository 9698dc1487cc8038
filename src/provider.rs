//! The provider boundary: pluggable backends (env, process, remote key-value
//! stores, secret stores) exposing `init`/`get`/`watch`, plus the synchronous
//! read-only view handed to `init` during staged initialization.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ConfabError;
use crate::path;
use crate::tree::{ConfigNode, SourceKind};

/// What a provider can serve. At most one staged provider per capability is
/// active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Remote,
    Secret,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Remote => "remote",
            Capability::Secret => "secret",
        }
    }

    pub(crate) fn source_kind(&self) -> SourceKind {
        match self {
            Capability::Remote => SourceKind::Remote,
            Capability::Secret => SourceKind::Secret,
        }
    }
}

/// Channel end a provider pushes live updates into.
pub type WatchSender = tokio::sync::mpsc::UnboundedSender<Value>;

/// A pluggable configuration backend.
///
/// `init` runs once during staged initialization and may read previously
/// resolved config through the view (e.g. a secret store reading its own
/// connection parameters from a value supplied by an earlier provider).
/// `get` serves individual placeholder fetches. Providers own their timeout
/// policy; the engine never imposes one.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn capability(&self) -> Capability;

    /// Bulk contribution overlaid onto the document at init time.
    /// Default: nothing.
    async fn init(&self, view: &ConfigView) -> Result<Value, ConfabError> {
        let _ = view;
        Ok(Value::Null)
    }

    async fn get(
        &self,
        key: &str,
        value_type: Option<&str>,
        alt_key: Option<&str>,
    ) -> Result<Value, ConfabError>;

    /// Whether this provider can notify about changes to a key.
    fn supports_watch(&self) -> bool {
        false
    }

    /// Register a live watch for `key`, pushing updates into `sender`.
    /// Default: no-op (static source).
    fn watch(&self, key: &str, sender: WatchSender, value_type: Option<&str>, alt_key: Option<&str>) {
        let _ = (key, sender, value_type, alt_key);
    }
}

/// Synchronous read-only snapshot over the config resolved so far. Handed to
/// provider `init` only.
pub struct ConfigView {
    root: ConfigNode,
}

impl ConfigView {
    pub(crate) fn new(root: ConfigNode) -> Self {
        Self { root }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        path::get(&self.root, key).map(path::read)
    }

    pub fn get_all(&self, keys: &[&str]) -> Vec<Option<Value>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    pub fn get_with_default(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }
}

/// Parse a raw string into a typed value: bool → integer → float → string.
fn parse_scalar(s: &str) -> Value {
    if s.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if s.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = s.parse::<f64>() {
        // Only treat as float when the string actually contains a dot,
        // so "NaN" / "inf" stay strings.
        if s.contains('.')
            && let Some(n) = serde_json::Number::from_f64(f)
        {
            return Value::Number(n);
        }
    }
    Value::String(s.to_string())
}

/// Coerce a raw string per an explicitly requested type, or heuristically
/// when no type was requested.
pub fn coerce(raw: &str, value_type: Option<&str>) -> Result<Value, ConfabError> {
    let invalid = |requested: &str| ConfabError::InvalidType {
        value: raw.to_string(),
        requested: requested.to_string(),
    };
    match value_type {
        None => Ok(parse_scalar(raw)),
        Some("string") => Ok(Value::String(raw.to_string())),
        Some("number") => {
            if let Ok(i) = raw.parse::<i64>() {
                return Ok(Value::Number(i.into()));
            }
            raw.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| invalid("number"))
        }
        Some("boolean") => match parse_scalar(raw) {
            Value::Bool(b) => Ok(Value::Bool(b)),
            _ => Err(invalid("boolean")),
        },
        Some("json") => serde_json::from_str(raw).map_err(|_| invalid("json")),
        Some(other) => Err(invalid(other)),
    }
}

/// Always-on built-in serving environment variables.
pub struct EnvProvider;

#[async_trait]
impl Provider for EnvProvider {
    fn name(&self) -> &str {
        "env"
    }

    fn capability(&self) -> Capability {
        Capability::Remote
    }

    async fn get(
        &self,
        key: &str,
        value_type: Option<&str>,
        alt_key: Option<&str>,
    ) -> Result<Value, ConfabError> {
        let raw = std::env::var(key)
            .ok()
            .or_else(|| alt_key.and_then(|alt| std::env::var(alt).ok()))
            .ok_or_else(|| ConfabError::ProviderFailure {
                provider: "env".into(),
                key: key.into(),
                message: "variable not set".into(),
            })?;
        coerce(&raw, value_type)
    }
}

/// Always-on built-in exposing metadata of the running process:
/// `pid`, `cwd`, `args`, `exe`.
pub struct ProcessProvider;

#[async_trait]
impl Provider for ProcessProvider {
    fn name(&self) -> &str {
        "process"
    }

    fn capability(&self) -> Capability {
        Capability::Remote
    }

    async fn get(
        &self,
        key: &str,
        _value_type: Option<&str>,
        _alt_key: Option<&str>,
    ) -> Result<Value, ConfabError> {
        match key {
            "pid" => Ok(Value::Number(std::process::id().into())),
            "cwd" => {
                let cwd = std::env::current_dir().map_err(|e| ConfabError::ProviderFailure {
                    provider: "process".into(),
                    key: key.into(),
                    message: e.to_string(),
                })?;
                Ok(Value::String(cwd.to_string_lossy().into_owned()))
            }
            "args" => Ok(Value::Array(
                std::env::args().map(Value::String).collect(),
            )),
            "exe" => {
                let exe = std::env::current_exe().map_err(|e| ConfabError::ProviderFailure {
                    provider: "process".into(),
                    key: key.into(),
                    message: e.to_string(),
                })?;
                Ok(Value::String(exe.to_string_lossy().into_owned()))
            }
            other => Err(ConfabError::ProviderFailure {
                provider: "process".into(),
                key: other.into(),
                message: "unknown process key (expected pid, cwd, args or exe)".into(),
            }),
        }
    }
}

pub(crate) fn source_kind_for(name: &str, capability: Capability) -> SourceKind {
    match name {
        "env" => SourceKind::Env,
        "process" => SourceKind::Process,
        _ => capability.source_kind(),
    }
}
