//! Expected-state fixtures.
//!
//! Expected snapshots can be kept out of the scenario file as JSON
//! fixtures, keyed by `(step, node, assertion)`. A fixture that cannot be
//! located or parsed is a fatal, non-retryable error for its assertion —
//! there is nothing to converge towards.

use crate::snapshot::Snapshot;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Key identifying one expected-state resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FixtureKey {
    pub node: String,
    pub step: String,
    pub assertion: String,
}

impl FixtureKey {
    #[must_use]
    pub fn new(
        node: impl Into<String>,
        step: impl Into<String>,
        assertion: impl Into<String>,
    ) -> Self {
        Self { node: node.into(), step: step.into(), assertion: assertion.into() }
    }
}

impl fmt::Display for FixtureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.step, self.node, self.assertion)
    }
}

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("fixture {0} not found")]
    NotFound(FixtureKey),
    #[error("fixture {key} failed to parse: {source}")]
    Parse {
        key: FixtureKey,
        #[source]
        source: serde_json::Error,
    },
    #[error("fixture {key} unreadable: {source}")]
    Io {
        key: FixtureKey,
        #[source]
        source: std::io::Error,
    },
}

/// Source of expected-state snapshots.
pub trait FixtureStore: Send + Sync {
    fn load(&self, key: &FixtureKey) -> Result<Snapshot, FixtureError>;
}

/// Directory-backed store: `<root>/<step>/<node>/<assertion>.json`.
pub struct DirFixtureStore {
    root: PathBuf,
}

impl DirFixtureStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &FixtureKey) -> PathBuf {
        self.root
            .join(&key.step)
            .join(&key.node)
            .join(format!("{}.json", key.assertion))
    }
}

impl FixtureStore for DirFixtureStore {
    fn load(&self, key: &FixtureKey) -> Result<Snapshot, FixtureError> {
        let path = self.path_for(key);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(FixtureError::NotFound(key.clone()));
            }
            Err(err) => return Err(FixtureError::Io { key: key.clone(), source: err }),
        };
        serde_json::from_slice(&raw).map_err(|err| FixtureError::Parse { key: key.clone(), source: err })
    }
}

/// Store with no fixtures, for scenarios that inline every expectation.
#[derive(Debug, Default)]
pub struct EmptyFixtureStore;

impl FixtureStore for EmptyFixtureStore {
    fn load(&self, key: &FixtureKey) -> Result<Snapshot, FixtureError> {
        Err(FixtureError::NotFound(key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_fixture(root: &std::path::Path, key: &FixtureKey, contents: &str) {
        let dir = root.join(&key.step).join(&key.node);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{}.json", key.assertion)), contents).unwrap();
    }

    #[test]
    fn loads_fixture_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let key = FixtureKey::new("r1", "step1", "srv6_locator");
        write_fixture(dir.path(), &key, r#"{"locators": [{"name": "loc1"}]}"#);

        let store = DirFixtureStore::new(dir.path());
        let snapshot = store.load(&key).unwrap();
        assert_eq!(snapshot, json!({"locators": [{"name": "loc1"}]}));
    }

    #[test]
    fn missing_fixture_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirFixtureStore::new(dir.path());
        let err = store
            .load(&FixtureKey::new("r1", "step1", "absent"))
            .unwrap_err();
        assert!(matches!(err, FixtureError::NotFound(_)));
        assert!(err.to_string().contains("step1/r1/absent"));
    }

    #[test]
    fn unparsable_fixture_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let key = FixtureKey::new("r1", "step2", "rib");
        write_fixture(dir.path(), &key, "{not json");

        let store = DirFixtureStore::new(dir.path());
        assert!(matches!(store.load(&key).unwrap_err(), FixtureError::Parse { .. }));
    }
}
