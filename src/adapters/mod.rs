//! Adapters Layer
//!
//! Inbound adapters drive the application (HTTP); outbound adapters are
//! implementations of domain ports.

pub mod inbound;
pub mod outbound;
