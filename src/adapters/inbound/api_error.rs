//! Route error type.
//!
//! Every route failure becomes a JSON response carrying a `RouteFailure`
//! extension, so pipeline stages after the handler can see how the request
//! failed without parsing the body.

use crate::application::DispatchError;
use crate::domain::errors::StoreError;
use crate::domain::value_objects::ConnectivityKind;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Response extension describing a failed route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteFailure {
    /// Connectivity tag of the underlying store error, if any
    pub kind: Option<ConnectivityKind>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Dispatch(DispatchError::CampaignNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Dispatch(DispatchError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            Self::Dispatch(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Store(_) => "internal_error",
            Self::Dispatch(DispatchError::CampaignNotFound(_)) => "not_found",
            Self::Dispatch(DispatchError::InvalidTransition { .. }) => "invalid_transition",
            Self::Dispatch(_) | Self::BadRequest(_) => "invalid_request",
        }
    }

    pub fn failure(&self) -> RouteFailure {
        RouteFailure {
            kind: match self {
                Self::Store(err) => Some(err.kind),
                _ => None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let failure = self.failure();
        let body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });

        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(failure);
        response
    }
}
