//! Document loaders. A loader claims file extensions and parses a document
//! into a raw JSON value; JSON and TOML ship built in, and custom loaders can
//! be registered on the builder.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::ConfabError;

pub trait Loader: Send + Sync {
    /// Extensions this loader claims, without the leading dot.
    fn extensions(&self) -> &'static [&'static str];

    fn load(&self, path: &Path) -> Result<Value, ConfabError>;
}

pub struct JsonLoader;

impl Loader for JsonLoader {
    fn extensions(&self) -> &'static [&'static str] {
        &["json"]
    }

    fn load(&self, path: &Path) -> Result<Value, ConfabError> {
        let text = fs::read_to_string(path).map_err(|e| ConfabError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConfabError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

pub struct TomlLoader;

impl Loader for TomlLoader {
    fn extensions(&self) -> &'static [&'static str] {
        &["toml"]
    }

    fn load(&self, path: &Path) -> Result<Value, ConfabError> {
        let text = fs::read_to_string(path).map_err(|e| ConfabError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let parsed: toml::Value = toml::from_str(&text).map_err(|e| ConfabError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::to_value(parsed).map_err(|e| ConfabError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Load `<dir>/<stem>.<ext>` with the first loader whose extension exists on
/// disk, in loader registration order. A document that simply is not there
/// is `Ok(None)`; a document that exists but fails to parse is an error.
pub(crate) fn load_document(
    dir: &Path,
    stem: &str,
    loaders: &[Box<dyn Loader>],
) -> Result<Option<Value>, ConfabError> {
    for loader in loaders {
        for ext in loader.extensions() {
            let candidate = dir.join(format!("{stem}.{ext}"));
            if candidate.is_file() {
                return loader.load(&candidate).map(Some);
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn default_loaders() -> Vec<Box<dyn Loader>> {
        vec![Box::new(JsonLoader), Box::new(TomlLoader)]
    }

    #[test]
    fn loads_json_document() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.json"),
            r#"{"server": {"port": 8080}}"#,
        )
        .unwrap();
        let doc = load_document(dir.path(), "default", &default_loaders())
            .unwrap()
            .unwrap();
        assert_eq!(doc, json!({"server": {"port": 8080}}));
    }

    #[test]
    fn loads_toml_document() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("production.toml"),
            "[server]\nhost = \"prod.example.com\"\n",
        )
        .unwrap();
        let doc = load_document(dir.path(), "production", &default_loaders())
            .unwrap()
            .unwrap();
        assert_eq!(doc, json!({"server": {"host": "prod.example.com"}}));
    }

    #[test]
    fn missing_document_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let doc = load_document(dir.path(), "default", &default_loaders()).unwrap();
        assert!(doc.is_none());
    }

    #[test]
    fn json_wins_when_both_extensions_exist() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("default.json"), r#"{"from": "json"}"#).unwrap();
        fs::write(dir.path().join("default.toml"), "from = \"toml\"\n").unwrap();
        let doc = load_document(dir.path(), "default", &default_loaders())
            .unwrap()
            .unwrap();
        assert_eq!(doc, json!({"from": "json"}));
    }

    #[test]
    fn broken_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("default.json"), "{nope").unwrap();
        let err = load_document(dir.path(), "default", &default_loaders()).unwrap_err();
        assert!(matches!(err, ConfabError::Parse { .. }));
    }
}
