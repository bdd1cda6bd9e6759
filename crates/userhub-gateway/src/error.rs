//! Translation of upstream gRPC failures into HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tonic::{Code, Status};

/// A failed call to the auth service, rendered as a JSON error body.
#[derive(Debug)]
pub struct ApiError(Status);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self.0.code() {
            Code::NotFound => StatusCode::NOT_FOUND,
            Code::InvalidArgument => StatusCode::BAD_REQUEST,
            Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<Status> for ApiError {
    fn from(status: Status) -> Self {
        Self(status)
    }
}

impl From<userhub_core::Error> for ApiError {
    fn from(err: userhub_core::Error) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        if code.is_server_error() {
            tracing::warn!("Upstream call failed: {:?}", self.0);
        }
        let body = json!({
            "statusCode": code.as_u16(),
            "message": self.0.message(),
        });
        (code, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use userhub_core::Error;

    fn code_of(status: Status) -> StatusCode {
        ApiError::from(status).status_code()
    }

    #[test]
    fn grpc_codes_map_to_http() {
        assert_eq!(code_of(Status::not_found("x")), StatusCode::NOT_FOUND);
        assert_eq!(code_of(Status::invalid_argument("x")), StatusCode::BAD_REQUEST);
        assert_eq!(code_of(Status::unavailable("x")), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(code_of(Status::deadline_exceeded("x")), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(code_of(Status::internal("x")), StatusCode::BAD_GATEWAY);
        assert_eq!(code_of(Status::aborted("x")), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn domain_errors_keep_their_meaning() {
        let err = ApiError::from(Error::NotFound {
            id: "42".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = ApiError::from(Error::InvalidDescriptor {
            reason: "page size must be greater than 0".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn response_carries_status_and_message() {
        let response = ApiError::from(Status::not_found("User not found by id: 7")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
