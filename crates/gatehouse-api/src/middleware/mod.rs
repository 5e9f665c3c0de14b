//! # Middleware
//!
//! Request counters and per-gate rate limiting. Both read their shared
//! state from request extensions installed by [`crate::app`].

pub mod metrics;
pub mod rate_limit;
