//! Client-side rate limiting logic and state management.

mod buckets;
mod clock;
mod limiter;

pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{LimiterState, RateLimiter, RateLimiterStats};
