//! Outbound request dispatch guarded by the client-side rate limiter.
//!
//! The SDK's endpoint wrappers hand every request to a
//! [`RateLimitedDispatcher`], which asks the limiter before passing the
//! request on to a [`Transport`].

mod dispatcher;
mod transport;

pub use dispatcher::RateLimitedDispatcher;
pub use transport::{Method, OutboundRequest, Transport, TransportResponse};
