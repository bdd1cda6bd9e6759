//! Defaults shared by the auth service and the gateway.

/// Number of users seeded into the auth service at startup, and the total the
/// gateway paginates over when no override is configured.
pub const TOTAL_USERS: usize = 500;

/// Default width of one page requested by the gateway.
pub const PAGE_SIZE: u32 = 50;

/// Upper bound on a single descriptor's `size` accepted by the auth service.
pub const MAX_PAGE_SIZE: u32 = 10_000;

/// Default idle timeout, in seconds, for one pagination session.
pub const SESSION_TIMEOUT_SECS: u64 = 30;

/// Identifier of a stored user (a hyphenated UUIDv4).
pub type UserId = String;
