mod credential_source;
mod delivery_transport;
mod health_monitor;
mod store_probe;

pub use credential_source::CredentialSource;
pub use delivery_transport::{Delivery, DeliveryError, DeliveryTransport};
pub use health_monitor::HealthMonitor;
pub use store_probe::StoreProbe;
