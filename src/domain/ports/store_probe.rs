//! Store Probe Port
//!
//! A lightweight connectivity check against the primary store.

use crate::domain::errors::StoreError;
use async_trait::async_trait;

/// Performs one connectivity check. Implementations enforce their own timeout.
#[async_trait]
pub trait StoreProbe: Send + Sync {
    async fn probe(&self) -> Result<(), StoreError>;

    /// Short description used in logs (e.g. `tcp://db:5432`).
    fn target(&self) -> String;
}
