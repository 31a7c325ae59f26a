//! Environment Credential Source
//!
//! Reads each credential from the process environment at check time.

use crate::domain::ports::CredentialSource;

#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentialSource;

impl EnvCredentialSource {
    pub fn new() -> Self {
        Self
    }
}

impl CredentialSource for EnvCredentialSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}
