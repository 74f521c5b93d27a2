//! SQLite-backed named cache storage and revision store.
//!
//! This module provides persistent request -> response stores using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Independently named caches keyed by SHA-256 of `(cache name, url)`
//! - Age and LRU eviction per cache
//! - A small durable key/value store for revision tags
//! - The worker registration record
//! - Automatic schema migrations and WAL mode for concurrent access

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod names;
pub mod registration;
pub mod revisions;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CacheEntry;
pub use names::{CacheName, ExpirationPolicy};
pub use registration::ActiveWorker;
pub use revisions::RevisionKey;
