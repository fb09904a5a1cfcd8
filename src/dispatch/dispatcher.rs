//! Rate limited request dispatcher.

use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use super::transport::{OutboundRequest, Transport, TransportResponse};
use crate::config::RateLimiterConfig;
use crate::error::{Result, SdkError};
use crate::ratelimit::{Clock, RateLimiter, RateLimiterStats, SystemClock};

/// Sends requests through a [`Transport`] unless the rate limiter objects.
///
/// The limiter sits behind a mutex so the dispatcher can be shared across
/// tasks. The lock is only held for the limiter decision, never while the
/// transport is awaited.
pub struct RateLimitedDispatcher<T: Transport, C: Clock + Clone = SystemClock> {
    /// The transport that performs the request
    transport: T,
    /// The rate limiter consulted before every request
    limiter: Mutex<RateLimiter<C>>,
}

impl<T: Transport> RateLimitedDispatcher<T, SystemClock> {
    /// Create a dispatcher whose limiter runs on wall-clock time.
    pub fn new(transport: T, config: RateLimiterConfig) -> Result<Self> {
        Self::with_clock(transport, config, SystemClock)
    }
}

impl<T: Transport, C: Clock + Clone> RateLimitedDispatcher<T, C> {
    /// Create a dispatcher whose limiter runs on the given clock.
    pub fn with_clock(transport: T, config: RateLimiterConfig, clock: C) -> Result<Self> {
        Ok(Self {
            transport,
            limiter: Mutex::new(RateLimiter::with_clock(config, clock)?),
        })
    }

    /// Send a request, or fail with [`SdkError::RateLimited`] without sending it.
    #[instrument(skip(self, request), fields(method = ?request.method, endpoint = %request.endpoint))]
    pub async fn dispatch(&self, request: OutboundRequest) -> Result<TransportResponse> {
        let (limited, retry_after) = {
            let mut limiter = self.limiter.lock();
            let limited = limiter.add_request_and_check_if_rate_limit_hit();
            (limited, limiter.time_until_reset())
        };

        if limited {
            warn!(retry_after = ?retry_after, "Request suppressed by client-side rate limiter");
            return Err(SdkError::RateLimited {
                endpoint: request.endpoint,
                retry_after,
            });
        }

        debug!("Dispatching request");
        self.transport.send(request).await
    }

    /// Replace the limiter with a fresh one built from new settings.
    ///
    /// Recorded requests and any active limit are discarded. The clock is kept.
    pub fn reconfigure(&self, config: RateLimiterConfig) -> Result<()> {
        let mut limiter = self.limiter.lock();
        let clock = limiter.clock().clone();
        *limiter = RateLimiter::with_clock(config, clock)?;
        Ok(())
    }

    /// Whether the limiter is tripped as of the last dispatch.
    pub fn is_rate_limited(&self) -> bool {
        self.limiter.lock().is_rate_limited()
    }

    /// Limiter counters as of the last dispatch.
    pub fn stats(&self) -> RateLimiterStats {
        self.limiter.lock().stats()
    }

    /// The wrapped transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}
