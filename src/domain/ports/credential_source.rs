//! Credential Source Port
//!
//! Where credential values are looked up. Values are never validated; a
//! non-empty value is all it takes to count as available.

/// Lookup of a named credential.
pub trait CredentialSource: Send + Sync {
    /// Raw value for `key`, if set.
    fn get(&self, key: &str) -> Option<String>;

    /// Whether `key` holds a non-empty value.
    fn is_set(&self, key: &str) -> bool {
        self.get(key).map(|v| !v.is_empty()).unwrap_or(false)
    }
}
