//! Server side of the `QueryUsers` pagination protocol.
//!
//! - [`coordinator`] - Per-session loop turning descriptors into chunks.
//! - [`processor`] - Computes a single chunk from the store.
//! - [`tracker`] - Live session accounting and graceful shutdown.

pub mod coordinator;
pub mod processor;
pub mod tracker;
