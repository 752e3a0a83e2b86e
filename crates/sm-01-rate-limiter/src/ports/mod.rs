pub mod inbound;

pub use inbound::RateLimiterApi;
