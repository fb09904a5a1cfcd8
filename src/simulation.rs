//! Replays synthetic traffic against a rate limiter on simulated time.
//!
//! Used by the `sdkguard-sim` binary to check how a set of limiter settings
//! reacts to a traffic shape before shipping them to players.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RateLimiterConfig;
use crate::error::Result;
use crate::ratelimit::{ManualClock, RateLimiter, RateLimiterStats};

/// Shape of the simulated request traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrafficProfile {
    /// The same number of requests every second
    Constant { per_second: u32 },
    /// One burst in the first second, then a constant trickle
    Burst { size: u32, then_per_second: u32 },
    /// `size` requests every `every_secs` seconds
    PeriodicBursts { size: u32, every_secs: u32 },
    /// A sine wave around `base` requests per second
    Undulating {
        base: f64,
        amplitude: f64,
        period_secs: u32,
    },
    /// Uniformly random rate in `mean ± spread`, reproducible from `seed`
    Jitter { mean: u32, spread: u32, seed: u64 },
}

impl TrafficProfile {
    /// Builds a generator yielding the request count for each simulated second.
    fn requests_per_second(&self) -> Box<dyn FnMut(u64) -> u32 + '_> {
        match *self {
            TrafficProfile::Constant { per_second } => Box::new(move |_| per_second),
            TrafficProfile::Burst {
                size,
                then_per_second,
            } => Box::new(move |sec| if sec == 1 { size } else { then_per_second }),
            TrafficProfile::PeriodicBursts { size, every_secs } => {
                let every = every_secs.max(1) as u64;
                Box::new(move |sec| if sec % every == 0 { size } else { 0 })
            }
            TrafficProfile::Undulating {
                base,
                amplitude,
                period_secs,
            } => {
                let period = period_secs.max(1) as f64;
                Box::new(move |sec| {
                    let phase = 2.0 * std::f64::consts::PI * sec as f64 / period;
                    (base + amplitude * phase.sin()).round().max(0.0) as u32
                })
            }
            TrafficProfile::Jitter { mean, spread, seed } => {
                let mut rng = StdRng::seed_from_u64(seed);
                let low = mean.saturating_sub(spread);
                let high = mean.saturating_add(spread);
                Box::new(move |_| rng.gen_range(low..=high))
            }
        }
    }
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    /// Requests the limiter let through
    pub requests_sent: u64,
    /// Requests the limiter suppressed
    pub requests_rejected: u64,
    /// Simulated second of the first trip
    pub first_trip_at_secs: Option<u64>,
    /// Seconds from the first trip until the limiter cleared, if it was observed
    pub recovered_after_secs: Option<u64>,
    /// Limiter counters at the end of the run
    pub final_stats: RateLimiterStats,
}

impl SimulationReport {
    fn tally(&mut self, limited: bool, sec: u64) {
        if limited {
            self.requests_rejected += 1;
            self.first_trip_at_secs.get_or_insert(sec);
        } else {
            self.requests_sent += 1;
        }
    }
}

/// A single simulation run.
#[derive(Debug, Clone)]
pub struct Simulation {
    /// Limiter settings under test
    pub config: RateLimiterConfig,
    /// Traffic to replay
    pub profile: TrafficProfile,
    /// Simulated seconds of traffic
    pub duration_secs: u64,
    /// Stop sending load at the first trip and wait for recovery
    pub cease_on_trip: bool,
}

impl Simulation {
    /// Create a simulation that keeps sending load for the whole duration.
    pub fn new(config: RateLimiterConfig, profile: TrafficProfile, duration_secs: u64) -> Self {
        Self {
            config,
            profile,
            duration_secs,
            cease_on_trip: false,
        }
    }

    /// Stop the load at the first trip and measure recovery instead.
    pub fn cease_on_trip(mut self) -> Self {
        self.cease_on_trip = true;
        self
    }

    /// Run the simulation from the Unix epoch on a manual clock.
    pub fn run(&self) -> Result<SimulationReport> {
        let clock = ManualClock::at_epoch();
        let mut limiter = RateLimiter::with_clock(self.config.clone(), clock.clone())?;
        let mut next_count = self.profile.requests_per_second();

        info!(
            profile = ?self.profile,
            duration_secs = self.duration_secs,
            cease_on_trip = self.cease_on_trip,
            "Starting rate limiter simulation"
        );

        let mut report = SimulationReport {
            requests_sent: 0,
            requests_rejected: 0,
            first_trip_at_secs: None,
            recovered_after_secs: None,
            final_stats: limiter.stats(),
        };

        // Baseline request at T0
        report.tally(limiter.add_request_and_check_if_rate_limit_hit(), 0);

        let mut sec = 0;
        'load: while sec < self.duration_secs {
            sec += 1;
            clock.advance_secs(1);
            for _ in 0..next_count(sec) {
                let limited = limiter.add_request_and_check_if_rate_limit_hit();
                report.tally(limited, sec);
                if limited && self.cease_on_trip {
                    break 'load;
                }
            }
        }

        if self.cease_on_trip && report.first_trip_at_secs.is_some() {
            report.recovered_after_secs = Self::wait_for_recovery(&mut limiter, &clock, &mut report);
        }

        report.final_stats = limiter.stats();
        debug!(report = ?report, "Simulation finished");
        Ok(report)
    }

    /// Poll once per simulated second until the limiter clears.
    fn wait_for_recovery(
        limiter: &mut RateLimiter<ManualClock>,
        clock: &ManualClock,
        report: &mut SimulationReport,
    ) -> Option<u64> {
        // Two full windows are more than any drain can take
        let max_wait = limiter.config().moving_average_window_seconds() * 2;
        for waited in 0..=max_wait {
            if !limiter.add_request_and_check_if_rate_limit_hit() {
                report.requests_sent += 1;
                return Some(waited);
            }
            report.requests_rejected += 1;
            clock.advance_secs(1);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_low_rate_never_trips() {
        let report = Simulation::new(
            RateLimiterConfig::default(),
            TrafficProfile::Constant { per_second: 3 },
            360,
        )
        .run()
        .unwrap();

        assert_eq!(report.first_trip_at_secs, None);
        assert_eq!(report.requests_rejected, 0);
        assert_eq!(report.requests_sent, 1 + 3 * 360);
    }

    #[test]
    fn test_heavy_load_recovers_in_bounded_time() {
        let report = Simulation::new(
            RateLimiterConfig::default(),
            TrafficProfile::Constant { per_second: 20 },
            480,
        )
        .cease_on_trip()
        .run()
        .unwrap();

        assert_eq!(report.first_trip_at_secs, Some(14));
        let recovered = report.recovered_after_secs.unwrap();
        assert!((120..=180).contains(&recovered), "recovered after {}", recovered);
        assert!(!report.final_stats.is_rate_limited);
    }

    #[test]
    fn test_continuous_load_keeps_rejecting() {
        let report = Simulation::new(
            RateLimiterConfig::default(),
            TrafficProfile::Constant { per_second: 20 },
            60,
        )
        .run()
        .unwrap();

        assert_eq!(report.first_trip_at_secs, Some(14));
        assert_eq!(report.requests_sent, 281 - 1);
        assert_eq!(report.requests_sent + report.requests_rejected, 1 + 20 * 60);
        assert!(report.final_stats.is_rate_limited);
        assert_eq!(report.recovered_after_secs, None);
    }

    #[test]
    fn test_burst_profile() {
        let under = Simulation::new(
            RateLimiterConfig::default(),
            TrafficProfile::Burst {
                size: 274,
                then_per_second: 0,
            },
            30,
        )
        .run()
        .unwrap();
        assert_eq!(under.first_trip_at_secs, None);

        let over = Simulation::new(
            RateLimiterConfig::default(),
            TrafficProfile::Burst {
                size: 300,
                then_per_second: 0,
            },
            30,
        )
        .run()
        .unwrap();
        assert_eq!(over.first_trip_at_secs, Some(1));
    }

    #[test]
    fn test_periodic_bursts_and_undulating_stay_under_limits() {
        let profiles = [
            TrafficProfile::PeriodicBursts {
                size: 9,
                every_secs: 3,
            },
            TrafficProfile::Undulating {
                base: 3.0,
                amplitude: 2.0,
                period_secs: 60,
            },
        ];
        for profile in profiles {
            let report = Simulation::new(RateLimiterConfig::default(), profile.clone(), 360)
                .run()
                .unwrap();
            assert_eq!(report.first_trip_at_secs, None, "{:?} tripped", profile);
        }
    }

    #[test]
    fn test_jitter_is_reproducible() {
        let profile = TrafficProfile::Jitter {
            mean: 3,
            spread: 2,
            seed: 7,
        };
        let first = Simulation::new(RateLimiterConfig::default(), profile.clone(), 120)
            .run()
            .unwrap();
        let second = Simulation::new(RateLimiterConfig::default(), profile, 120)
            .run()
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_disabled_limiter_never_rejects() {
        let report = Simulation::new(
            RateLimiterConfig::disabled(),
            TrafficProfile::Constant { per_second: 50 },
            120,
        )
        .run()
        .unwrap();
        assert_eq!(report.requests_rejected, 0);
        assert_eq!(report.first_trip_at_secs, None);
    }

    #[test]
    fn test_profile_deserializes_from_yaml() {
        let yaml = "kind: periodic_bursts\nsize: 9\nevery_secs: 3\n";
        let profile: TrafficProfile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            profile,
            TrafficProfile::PeriodicBursts {
                size: 9,
                every_secs: 3
            }
        );
    }
}
