//! # StormStack Net
//!
//! Shared HTTP plumbing for both daemons: the response envelope
//! (`{data, meta}` / `{error}`), the `StormError` → HTTP status mapping,
//! bearer-token extraction, per-principal rate limiting, and the server
//! builder with the house middleware stack.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod extractors;
pub mod ratelimit;
pub mod responses;
pub mod server;

pub use extractors::BearerToken;
pub use ratelimit::{RateLimitVerdict, RateLimiter};
pub use responses::{ApiError, ApiResponse, ResponseMeta};
pub use server::{shutdown_signal, ServerBuilder, ServerConfig};
