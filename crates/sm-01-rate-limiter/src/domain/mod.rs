//! Domain layer for the rate limiter.

pub mod entities;
pub mod errors;
pub mod policy;

pub use entities::{Decision, RateLimitKey};
pub use errors::RateLimitError;
pub use policy::RoutePolicy;
