//! Domain Layer
//!
//! Entities, value objects, ports and the pure guard services.

pub mod entities;
pub mod errors;
pub mod ports;
pub mod services;
pub mod value_objects;
