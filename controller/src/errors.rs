use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::Serialize;

use crate::grpc_client::NodeError;

/// Error taxonomy the controller exposes across its RPC surface. Mirrors
/// the five-way split tenants are expected to branch on: missing object,
/// exhausted capacity, a slow downstream host, an internal fault, or a
/// malformed request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found")]
    NotFound,

    #[error("no warm instance available for the requested shape")]
    ResourceExhausted,

    #[error("host daemon did not respond in time")]
    DeadlineExceeded,

    #[error("{0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            Error::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Re-surfaces a host daemon failure as the taxonomy member a tenant would
/// expect, instead of collapsing every gRPC failure to `Internal`: a host
/// reporting `NotFound` (VM already gone on that side) becomes the
/// controller's own `NotFound`, and so on for the codes the host service
/// actually returns (see `hostd::service::map_supervisor_error`).
impl From<NodeError> for Error {
    fn from(e: NodeError) -> Self {
        match e {
            NodeError::Connect(e) => Error::Internal(e.to_string()),
            NodeError::Rpc(status) => match status.code() {
                tonic::Code::NotFound => Error::NotFound,
                tonic::Code::DeadlineExceeded => Error::DeadlineExceeded,
                tonic::Code::ResourceExhausted => Error::ResourceExhausted,
                tonic::Code::InvalidArgument => Error::InvalidArgument(status.message().to_string()),
                _ => Error::Internal(status.message().to_string()),
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        tracing::error!("API error: {:?}", self);
        let message = self.to_string();
        (self.status_code(), Json(ErrorResponse { message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_exhausted_maps_to_too_many_requests() {
        assert_eq!(Error::ResourceExhausted.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(Error::NotFound.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unmapped_host_codes_collapse_to_internal_server_error() {
        let status = tonic::Status::unavailable("down");
        let err = Error::from(NodeError::Rpc(status));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn host_not_found_surfaces_as_controller_not_found() {
        let status = tonic::Status::not_found("vm gone");
        let err = Error::from(NodeError::Rpc(status));
        assert!(matches!(err, Error::NotFound));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn host_deadline_exceeded_surfaces_as_controller_deadline_exceeded() {
        let status = tonic::Status::deadline_exceeded("monitor socket never came up");
        let err = Error::from(NodeError::Rpc(status));
        assert!(matches!(err, Error::DeadlineExceeded));
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }
}
