//! Shared types and error definitions used by the auth service and the
//! gateway.
//!
//! - [`error`] - Unified error type and its mapping onto `tonic::Status`.
//! - [`types`] - Defaults shared by both binaries.
//! - [`proto`] - Generated protobuf messages and the `UsersService` stubs.

pub mod error;
pub mod types;

pub use error::{Error, Result};

/// gRPC service and message definitions generated from `proto/auth.proto`.
///
/// `QueryUsers` is the only streaming call: every [`PaginationDto`] sent on
/// the request stream is answered by exactly one [`Users`] chunk on the
/// response stream, in the same order.
///
/// [`PaginationDto`]: proto::PaginationDto
/// [`Users`]: proto::Users
pub mod proto {
    tonic::include_proto!("auth");
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("auth_descriptor");
}
