//! gRPC service implementation.
//!
//! This module contains the client-facing `UsersService` implementation. CRUD
//! calls are answered directly from the [`UserStore`]; `QueryUsers` sessions
//! are handed off to a dedicated task per call.
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`AuthService`).
//!
//! [`UserStore`]: crate::server::store::UserStore

pub mod handler;
