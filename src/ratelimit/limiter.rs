//! Core client-side rate limiter implementation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::buckets::BucketRing;
use super::clock::{Clock, SystemClock};
use crate::config::RateLimiterConfig;
use crate::error::Result;

/// Whether the limiter is currently advising callers to hold requests back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterState {
    /// Requests may be sent
    Normal,
    /// Requests should be suppressed until the bucket ring has drained
    RateLimited {
        /// When the limit tripped
        since: DateTime<Utc>,
        /// When the last recorded bucket ages out of the ring
        resolves_at: DateTime<Utc>,
    },
}

/// Point-in-time view of the limiter's counters, as of the last recorded call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimiterStats {
    /// Requests recorded across the whole moving average window
    pub requests_in_moving_window: u64,
    /// Requests recorded in the current tripwire time frame
    pub requests_in_tripwire_window: u64,
    /// Largest count held by a single bucket
    pub max_requests_in_single_bucket: u32,
    /// Moving average expressed as requests per tripwire time frame
    pub moving_average_per_time_frame: f64,
    /// Whether the limiter is tripped
    pub is_rate_limited: bool,
}

/// Client-side request rate governor.
///
/// Every outbound request should be announced through
/// [`add_request_and_check_if_rate_limit_hit`](Self::add_request_and_check_if_rate_limit_hit)
/// before it is sent. Two signals can trip the limiter:
///
/// - the tripwire: more than `max_requests_per_tripwire_time_frame` requests
///   inside the most recent tripwire time frame;
/// - the moving average: the request rate over the whole ring, scaled to one
///   tripwire time frame, above `moving_average_threshold_ratio` of that ceiling.
///
/// Once tripped, calls are no longer recorded and the limiter stays tripped
/// until every recorded bucket has rotated out of the ring.
///
/// The limiter does no locking of its own. Share it behind a mutex when
/// requests are dispatched from several threads.
#[derive(Debug)]
pub struct RateLimiter<C: Clock = SystemClock> {
    config: RateLimiterConfig,
    clock: C,
    buckets: BucketRing,
    /// Bucket epoch of the ring head, `None` until the first request is seen
    last_epoch: Option<i64>,
    state: LimiterState,
}

impl RateLimiter<SystemClock> {
    /// Create a limiter driven by wall-clock time.
    pub fn new(config: RateLimiterConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a limiter driven by the given clock.
    ///
    /// Fails if the configuration cannot describe a working bucket ring.
    pub fn with_clock(config: RateLimiterConfig, clock: C) -> Result<Self> {
        config.validate()?;

        let buckets = BucketRing::new(
            config.moving_average_bucket_count(),
            config.buckets_per_time_frame as usize,
        )?;

        info!(
            enabled = config.enabled,
            seconds_per_bucket = config.seconds_per_bucket,
            tripwire_time_frame_secs = config.tripwire_time_frame_seconds(),
            max_requests_per_tripwire_time_frame = config.max_requests_per_tripwire_time_frame,
            moving_average_window_secs = config.moving_average_window_seconds(),
            "Rate limiter initialized"
        );

        Ok(Self {
            config,
            clock,
            buckets,
            last_epoch: None,
            state: LimiterState::Normal,
        })
    }

    /// Record one request at the current time and report whether the caller is rate limited.
    ///
    /// Returns `true` when this request tripped a limit, or when an earlier
    /// trip has not cleared yet. Requests made while limited are not counted.
    /// Always returns `false` when the limiter is disabled.
    pub fn add_request_and_check_if_rate_limit_hit(&mut self) -> bool {
        if !self.config.enabled {
            return false;
        }

        let now = self.clock.now();
        self.move_current_bucket(now);

        if let LimiterState::RateLimited { since, resolves_at } = self.state {
            if !self.buckets.is_empty() {
                trace!(
                    resolves_at = %resolves_at,
                    requests_in_moving_window = self.buckets.total(),
                    "Request suppressed while rate limited"
                );
                return true;
            }

            info!(
                limited_for_secs = (now - since).num_seconds(),
                "Rate limit lifted"
            );
            self.state = LimiterState::Normal;
        }

        self.buckets.record();

        let tripwire_total = self.buckets.tripwire_total();
        let moving_average = self.moving_average_per_time_frame();
        let tripwire_hit = tripwire_total > self.config.max_requests_per_tripwire_time_frame as u64;
        let moving_average_hit = moving_average > self.config.moving_average_threshold();

        trace!(
            requests_in_tripwire_window = tripwire_total,
            moving_average_per_time_frame = moving_average,
            "Request recorded"
        );

        if tripwire_hit || moving_average_hit {
            let resolves_at = self.resolves_at(now);
            warn!(
                tripwire_hit,
                moving_average_hit,
                requests_in_tripwire_window = tripwire_total,
                moving_average_per_time_frame = moving_average,
                resolves_at = %resolves_at,
                "Client-side rate limit hit"
            );
            self.state = LimiterState::RateLimited {
                since: now,
                resolves_at,
            };
            return true;
        }

        false
    }

    /// Whether the limiter tripped and has not cleared as of the last call.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.state, LimiterState::RateLimited { .. })
    }

    /// Current state as of the last call.
    pub fn state(&self) -> LimiterState {
        self.state
    }

    /// Time left until the limit clears, or `None` when not limited.
    pub fn time_until_reset(&self) -> Option<Duration> {
        match self.state {
            LimiterState::Normal => None,
            LimiterState::RateLimited { resolves_at, .. } => Some(
                (resolves_at - self.clock.now())
                    .to_std()
                    .unwrap_or(Duration::ZERO),
            ),
        }
    }

    /// Whole seconds left until the limit clears, rounded up; zero when not limited.
    pub fn seconds_left_of_rate_limit(&self) -> u64 {
        self.time_until_reset()
            .map(|left| {
                let secs = left.as_secs();
                if left.subsec_nanos() > 0 {
                    secs + 1
                } else {
                    secs
                }
            })
            .unwrap_or(0)
    }

    /// Counters as of the last call.
    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            requests_in_moving_window: self.buckets.total(),
            requests_in_tripwire_window: self.buckets.tripwire_total(),
            max_requests_in_single_bucket: self.buckets.max_in_single_bucket(),
            moving_average_per_time_frame: self.moving_average_per_time_frame(),
            is_rate_limited: self.is_rate_limited(),
        }
    }

    /// Forget every recorded request and clear any active limit.
    pub fn reset(&mut self) {
        debug!("Rate limiter reset");
        self.buckets.clear();
        self.last_epoch = None;
        self.state = LimiterState::Normal;
    }

    /// The settings this limiter was built with.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// The clock driving this limiter.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn bucket_millis(&self) -> i64 {
        self.config.seconds_per_bucket as i64 * 1000
    }

    fn bucket_epoch(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis().div_euclid(self.bucket_millis())
    }

    /// Rotate the ring so its head is the bucket holding `now`.
    fn move_current_bucket(&mut self, now: DateTime<Utc>) {
        let epoch = self.bucket_epoch(now);
        match self.last_epoch {
            None => {
                // First request: nothing to measure against yet
                self.last_epoch = Some(epoch);
            }
            Some(last) if epoch > last => {
                let steps = (epoch - last) as u64;
                debug!(steps, "Advancing rate limiter buckets");
                self.buckets.advance(steps);
                self.last_epoch = Some(epoch);
            }
            // Same time slice, or the clock went backwards
            Some(_) => {}
        }
    }

    fn moving_average_per_time_frame(&self) -> f64 {
        self.buckets.total() as f64
            / self.config.count_moving_average_across_n_tripwire_time_frames as f64
    }

    /// End of the moving average window measured from the start of the current bucket.
    ///
    /// Saturates at the latest representable instant.
    fn resolves_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let into_bucket = now.timestamp_millis().rem_euclid(self.bucket_millis());
        let window = i64::try_from(self.config.moving_average_window_seconds())
            .ok()
            .and_then(chrono::Duration::try_seconds);

        window
            .and_then(|window| {
                now.checked_sub_signed(chrono::Duration::milliseconds(into_bucket))?
                    .checked_add_signed(window)
            })
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
