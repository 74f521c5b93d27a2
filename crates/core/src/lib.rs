//! Core types and shared functionality for tether.
//!
//! This crate provides:
//! - Named cache storage and the revision store with a SQLite backend
//! - Cache names and their expiration policies
//! - Partial and template bundle documents
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod model;

pub use cache::{CacheDb, CacheEntry, CacheName, ExpirationPolicy, RevisionKey};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use model::{ManifestEntry, Partial, TemplateBundle, TemplateDocument};
