//! HTTP surface
//!
//! Thin axum adapter over [`JobDispatcher`](crate::JobDispatcher): request
//! parsing, response rendering, and the mapping from [`DispatchError`] to
//! status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::DispatchError;

pub mod routes;
pub mod server;

pub use routes::{AppState, JobView, create_router};
pub use server::{HttpConfig, HttpServer};

impl DispatchError {
    /// Status code this error is reported with over HTTP
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
            DispatchError::QueueUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        (status, self.to_string()).into_response()
    }
}
