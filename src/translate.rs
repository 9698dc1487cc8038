use std::sync::Arc;

use serde_json::Value;

/// A pure value-rewrite pass applied to every leaf of a raw document before
/// it enters the builder, and to every freshly fetched provider value.
///
/// Typical uses: string interpolation, or rewriting URL-shaped strings into
/// placeholder markers. Must be total — there is no failure channel at this
/// layer.
pub trait Translator: Send + Sync {
    fn translate(&self, value: Value) -> Value;
}

/// Apply `translators` to every leaf, deepest first. Containers are
/// traversed, not translated; a translator that rewrites a leaf into a
/// container (e.g. a placeholder marker) is not re-descended into.
pub fn apply(translators: &[Arc<dyn Translator>], value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, child)| (key, apply(translators, child)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| apply(translators, item))
                .collect(),
        ),
        leaf => translators
            .iter()
            .fold(leaf, |value, translator| translator.translate(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upcase;

    impl Translator for Upcase {
        fn translate(&self, value: Value) -> Value {
            match value {
                Value::String(s) => Value::String(s.to_uppercase()),
                other => other,
            }
        }
    }

    struct UrlToMarker;

    impl Translator for UrlToMarker {
        fn translate(&self, value: Value) -> Value {
            match value {
                Value::String(s) if s.starts_with("vault://") => {
                    json!({"source": "vault", "key": s.trim_start_matches("vault://")})
                }
                other => other,
            }
        }
    }

    #[test]
    fn applies_to_every_leaf() {
        let translators: Vec<Arc<dyn Translator>> = vec![Arc::new(Upcase)];
        let out = apply(
            &translators,
            json!({"a": "x", "nested": {"b": ["y", 1, true]}}),
        );
        assert_eq!(out, json!({"a": "X", "nested": {"b": ["Y", 1, true]}}));
    }

    #[test]
    fn rewritten_marker_is_not_redescended() {
        let translators: Vec<Arc<dyn Translator>> = vec![Arc::new(UrlToMarker), Arc::new(Upcase)];
        let out = apply(&translators, json!({"password": "vault://db/password"}));
        // the marker produced by the first translator is left as-is
        assert_eq!(
            out,
            json!({"password": {"source": "vault", "key": "db/password"}})
        );
    }

    #[test]
    fn no_translators_is_identity() {
        let doc = json!({"a": [1, "b", null]});
        assert_eq!(apply(&[], doc.clone()), doc);
    }

    #[test]
    fn translators_chain_in_order() {
        struct Suffix(&'static str);
        impl Translator for Suffix {
            fn translate(&self, value: Value) -> Value {
                match value {
                    Value::String(s) => Value::String(format!("{s}{}", self.0)),
                    other => other,
                }
            }
        }
        let translators: Vec<Arc<dyn Translator>> =
            vec![Arc::new(Suffix("-a")), Arc::new(Suffix("-b"))];
        assert_eq!(apply(&translators, json!("x")), json!("x-a-b"));
    }
}
