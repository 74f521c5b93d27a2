//! Client code for tether.
//!
//! This crate provides the origin fetch client, the `Network` seam used by
//! everything that talks to the origin, and the caching strategy engine.

pub mod fetch;
pub mod strategy;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use fetch::{FetchClient, FetchConfig, FetchResponse, Network, Request, ResponseSource};
pub use strategy::{CacheableResponse, Expiration, Strategy, StrategyKind};
