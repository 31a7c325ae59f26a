mod api_error;
mod api_server;
mod guards;

pub use api_error::{ApiError, RouteFailure};
pub use api_server::{router, ApiServer, AppState};
pub use guards::{
    credential_gate, reclassify_errors, require_credentials, require_healthy_database,
    strict_health_gate, with_dependency_guards, write_guard, GateState,
};
