//! Static Credential Source
//!
//! In-memory credential table, used for explicit configuration and tests.

use crate::domain::ports::CredentialSource;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct StaticCredentialSource {
    values: DashMap<String, String>,
}

impl StaticCredentialSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source with each of `keys` set to a placeholder value.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let source = Self::new();
        for key in keys {
            source.insert(key, "configured");
        }
        source
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.values.remove(key);
    }
}

impl CredentialSource for StaticCredentialSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.value().clone())
    }
}
