#[cfg(test)]
pub mod test {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;

    use crate::error::ConfabError;
    use crate::provider::{Capability, ConfigView, Provider, WatchSender};

    /// Provider test double: serves a fixed key → value table, optionally a
    /// bulk init contribution and live watches. Counts `get`/`init` calls so
    /// tests can assert that sticky errors never re-invoke the provider.
    pub struct StaticProvider {
        name: String,
        capability: Capability,
        bulk: Value,
        values: HashMap<String, Value>,
        watchable: bool,
        probe_key: Option<String>,
        pub calls: AtomicUsize,
        pub init_calls: AtomicUsize,
        pub probed: Mutex<Option<Value>>,
        pub watchers: Mutex<HashMap<String, WatchSender>>,
    }

    impl StaticProvider {
        pub fn new(name: &str, capability: Capability) -> Self {
            Self {
                name: name.to_string(),
                capability,
                bulk: Value::Null,
                values: HashMap::new(),
                watchable: false,
                probe_key: None,
                calls: AtomicUsize::new(0),
                init_calls: AtomicUsize::new(0),
                probed: Mutex::new(None),
                watchers: Mutex::new(HashMap::new()),
            }
        }

        pub fn value(mut self, key: &str, value: Value) -> Self {
            self.values.insert(key.to_string(), value);
            self
        }

        pub fn bulk(mut self, value: Value) -> Self {
            self.bulk = value;
            self
        }

        pub fn watchable(mut self) -> Self {
            self.watchable = true;
            self
        }

        /// Record `view.get(key)` during init, so staged-order tests can
        /// check what this provider saw of the config resolved so far.
        pub fn probe(mut self, key: &str) -> Self {
            self.probe_key = Some(key.to_string());
            self
        }

        /// Simulate a provider-side change notification.
        pub fn push(&self, key: &str, value: Value) {
            if let Some(sender) = self.watchers.lock().get(key) {
                let _ = sender.send(value);
            }
        }
    }

    #[async_trait]
    impl Provider for StaticProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn capability(&self) -> Capability {
            self.capability
        }

        async fn init(&self, view: &ConfigView) -> Result<Value, ConfabError> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(key) = &self.probe_key {
                *self.probed.lock() = view.get(key);
            }
            Ok(self.bulk.clone())
        }

        async fn get(
            &self,
            key: &str,
            _value_type: Option<&str>,
            alt_key: Option<&str>,
        ) -> Result<Value, ConfabError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.values
                .get(key)
                .or_else(|| alt_key.and_then(|alt| self.values.get(alt)))
                .cloned()
                .ok_or_else(|| ConfabError::ProviderFailure {
                    provider: self.name.clone(),
                    key: key.to_string(),
                    message: "no such key".into(),
                })
        }

        fn supports_watch(&self) -> bool {
            self.watchable
        }

        fn watch(
            &self,
            key: &str,
            sender: WatchSender,
            _value_type: Option<&str>,
            _alt_key: Option<&str>,
        ) {
            self.watchers.lock().insert(key.to_string(), sender);
        }
    }
}
