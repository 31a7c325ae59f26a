mod env_credential_source;
mod http_store_probe;
mod log_transport;
mod static_credential_source;
mod tcp_store_probe;
mod webhook_transport;

pub use env_credential_source::EnvCredentialSource;
pub use http_store_probe::HttpStoreProbe;
pub use log_transport::LogTransport;
pub use static_credential_source::StaticCredentialSource;
pub use tcp_store_probe::TcpStoreProbe;
pub use webhook_transport::WebhookTransport;
