//! Caching strategies.
//!
//! A `Strategy` binds one of the three behaviours to a named cache:
//!
//! - **Cache first**: serve a fresh cached entry, otherwise go to the network.
//! - **Network first**: serve the network response whatever its status, falling
//!   back to the cache only when the network request fails outright.
//! - **Stale while revalidate**: serve the cached entry immediately and refresh
//!   it in the background; go to the network on a miss.
//!
//! Every network response passes the `CacheableResponse` filter before it is
//! written, and every write is followed by `Expiration` enforcement. Cache
//! failures are logged and never fail the request.

mod plugins;

pub use plugins::{CacheableResponse, Expiration};

use std::sync::Arc;

use reqwest::{Method, Url};
use tether_core::{CacheDb, CacheName, Error, ExpirationPolicy};

use crate::fetch::{FetchResponse, Network, Request};

/// The three strategy behaviours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

/// A strategy bound to a named cache.
#[derive(Clone)]
pub struct Strategy {
    kind: StrategyKind,
    cache: CacheName,
    db: CacheDb,
    network: Arc<dyn Network>,
    cacheable: CacheableResponse,
    expiration: Expiration,
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("kind", &self.kind)
            .field("cache", &self.cache)
            .field("cacheable", &self.cacheable)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

impl Strategy {
    /// Create a strategy using the cache's own expiration policy.
    pub fn new(kind: StrategyKind, cache: CacheName, db: CacheDb, network: Arc<dyn Network>) -> Self {
        Self {
            kind,
            cache,
            db,
            network,
            cacheable: CacheableResponse::default(),
            expiration: Expiration::new(cache.expiration()),
        }
    }

    pub fn cache_first(cache: CacheName, db: CacheDb, network: Arc<dyn Network>) -> Self {
        Self::new(StrategyKind::CacheFirst, cache, db, network)
    }

    pub fn network_first(cache: CacheName, db: CacheDb, network: Arc<dyn Network>) -> Self {
        Self::new(StrategyKind::NetworkFirst, cache, db, network)
    }

    pub fn stale_while_revalidate(cache: CacheName, db: CacheDb, network: Arc<dyn Network>) -> Self {
        Self::new(StrategyKind::StaleWhileRevalidate, cache, db, network)
    }

    /// Replace the cacheable-status filter.
    pub fn with_cacheable(mut self, cacheable: CacheableResponse) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// Replace the expiration policy.
    pub fn with_expiration(mut self, policy: ExpirationPolicy) -> Self {
        self.expiration = Expiration::new(policy);
        self
    }

    /// Answer `request` according to this strategy.
    pub async fn handle(&self, request: &Request) -> Result<FetchResponse, Error> {
        match self.kind {
            StrategyKind::CacheFirst => {
                if let Some(cached) = self.cached(&request.url).await {
                    return Ok(cached);
                }
                self.fetch_and_store(request).await
            }
            StrategyKind::NetworkFirst => match self.fetch_and_store(request).await {
                Ok(response) => Ok(response),
                Err(err) => match self.cached(&request.url).await {
                    Some(cached) => {
                        tracing::warn!(cache = %self.cache, url = %request.url, "network failed, serving cached: {err}");
                        Ok(cached)
                    }
                    None => Err(err),
                },
            },
            StrategyKind::StaleWhileRevalidate => {
                let Some(cached) = self.cached(&request.url).await else {
                    return self.fetch_and_store(request).await;
                };

                let strategy = self.clone();
                let request = request.clone();
                tokio::spawn(async move {
                    if let Err(err) = strategy.fetch_and_store(&request).await {
                        tracing::debug!(cache = %strategy.cache, url = %request.url, "revalidation failed: {err}");
                    }
                });

                Ok(cached)
            }
        }
    }

    /// A servable cached response for `url`, if any.
    async fn cached(&self, url: &Url) -> Option<FetchResponse> {
        let entry = match self.db.match_entry(self.cache, url.as_str()).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::debug!(cache = %self.cache, %url, "cache miss");
                return None;
            }
            Err(err) => {
                tracing::warn!(cache = %self.cache, %url, "cache read failed: {err}");
                return None;
            }
        };

        if !self.expiration.is_fresh(&entry) {
            tracing::debug!(cache = %self.cache, %url, "cached entry expired");
            if let Err(err) = self.db.delete_entry(self.cache, url.as_str()).await {
                tracing::warn!(cache = %self.cache, %url, "failed to drop expired entry: {err}");
            }
            return None;
        }

        match FetchResponse::from_cache_entry(entry) {
            Ok(response) => {
                tracing::debug!(cache = %self.cache, %url, "cache hit");
                Some(response)
            }
            Err(err) => {
                tracing::warn!(cache = %self.cache, %url, "unreadable cache entry: {err}");
                None
            }
        }
    }

    async fn fetch_and_store(&self, request: &Request) -> Result<FetchResponse, Error> {
        let response = self.network.fetch(request).await?;

        if request.method == Method::GET && self.cacheable.is_cacheable(&response) {
            if let Err(err) = self.db.put_entry(self.cache, &response.to_cache_entry()).await {
                tracing::warn!(cache = %self.cache, url = %request.url, "cache write failed: {err}");
            } else if let Err(err) = self.expiration.enforce(&self.db, self.cache).await {
                tracing::warn!(cache = %self.cache, "expiration failed: {err}");
            }
        }

        Ok(response)
    }
}
