//! Error types for the user service and its pagination protocol.
//!
//! This module defines the central `Error` enum shared by the auth service and
//! the gateway. It implements `From<Error>` for `tonic::Status` so handlers can
//! propagate failures to gRPC clients with `?`.
//!
//! ## Error Cases
//! - `NotFound`: The requested user id is absent from the store.
//! - `StreamProtocol`: A stream producer failed instead of completing, or a
//!   pipe was used after it was closed.
//! - `InvalidDescriptor`: A page descriptor has a zero or oversized `size`.
//! - `ChannelError`: An internal communication failure between tasks.
//! - `SessionTimeout`: No message arrived within the session idle timeout.
//! - `RequestCancelled`: The peer abandoned the session.
//! - `ServiceShutdown`: A request arrived while the service was shutting down.

use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the user service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// No user is stored under `id`.
    #[error("User not found by id: {id}")]
    NotFound { id: String },

    /// The request stream ended in an error instead of a clean completion.
    #[error("Stream protocol error: {reason}")]
    StreamProtocol { reason: String },

    /// A page descriptor violates the protocol bounds.
    #[error("Invalid page descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    /// Internal channel send/receive failure (e.g., closed or full channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The session stayed idle longer than the configured timeout.
    #[error("Session timed out")]
    SessionTimeout,

    /// The peer aborted the request.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    /// Converts a status received from the remote end of a stream into a
    /// session-fatal protocol error.
    pub fn from_stream_status(status: &Status) -> Self {
        match status.code() {
            Code::Cancelled => Self::RequestCancelled,
            Code::DeadlineExceeded => Self::SessionTimeout,
            Code::Unavailable => Self::ServiceShutdown,
            Code::InvalidArgument => Self::InvalidDescriptor {
                reason: status.message().to_string(),
            },
            _ => Self::StreamProtocol {
                reason: format!("{:?}: {}", status.code(), status.message()),
            },
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound { .. } => Status::not_found(err.to_string()),
            Error::StreamProtocol { reason } => Status::aborted(reason),
            Error::InvalidDescriptor { reason } => Status::invalid_argument(reason),
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {}", context))
            }
            Error::SessionTimeout => Status::deadline_exceeded("Pagination session timed out"),
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_keeps_the_id_in_the_message() {
        let status: Status = Error::NotFound {
            id: "abc".to_string(),
        }
        .into();
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "User not found by id: abc");
    }

    #[test]
    fn stream_status_maps_back_to_session_errors() {
        let status: Status = Error::InvalidDescriptor {
            reason: "size must be greater than 0".to_string(),
        }
        .into();
        assert_eq!(
            Error::from_stream_status(&status),
            Error::InvalidDescriptor {
                reason: "size must be greater than 0".to_string()
            }
        );

        let status: Status = Error::SessionTimeout.into();
        assert_eq!(Error::from_stream_status(&status), Error::SessionTimeout);

        let status = Status::internal("boom");
        assert!(matches!(
            Error::from_stream_status(&status),
            Error::StreamProtocol { .. }
        ));
    }
}
