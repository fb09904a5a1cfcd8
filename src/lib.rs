//! Sdkguard - Client-Side Request Rate Limiting for Game Backend SDKs
//!
//! This crate implements the rate limiter a game client consults before every
//! call to its backend-as-a-service API. It combines a short tripwire window
//! that catches sudden bursts with a longer moving average that catches
//! sustained load, and recovers on its own once the offending traffic has
//! aged out of its buckets.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod ratelimit;
pub mod simulation;
