pub mod rate_limiting;

pub use rate_limiting::{RateLimitConfig, RateLimitResult, RateLimiter};
