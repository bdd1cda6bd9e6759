//! Server-side components of the `userhub-auth` service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/env configuration.
//! - [`service`] - gRPC `UsersService` implementation.
//! - [`store`] - In-memory user collection.
//! - [`streaming`] - Pagination sessions and shutdown bookkeeping.
//! - [`telemetry`] - Logging, tracing and metrics initialization.

pub mod config;
pub mod service;
pub mod store;
pub mod streaming;
pub mod telemetry;
