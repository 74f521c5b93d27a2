//! Plugins composed into a strategy: which responses may be stored, and when
//! stored responses stop being served.

use tether_core::{CacheDb, CacheEntry, CacheName, Error, ExpirationPolicy};

use crate::fetch::FetchResponse;

/// Restricts cache writes to responses with one of the listed statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheableResponse {
    statuses: Vec<u16>,
}

impl Default for CacheableResponse {
    fn default() -> Self {
        Self { statuses: vec![200] }
    }
}

impl CacheableResponse {
    pub fn statuses(statuses: &[u16]) -> Self {
        Self { statuses: statuses.to_vec() }
    }

    pub fn is_cacheable(&self, response: &FetchResponse) -> bool {
        self.statuses.contains(&response.status.as_u16())
    }
}

/// Applies an `ExpirationPolicy` on read (max age) and after writes (max age and max entries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Expiration {
    policy: ExpirationPolicy,
}

impl Expiration {
    pub fn new(policy: ExpirationPolicy) -> Self {
        Self { policy }
    }

    /// Whether `entry` may still be served.
    pub fn is_fresh(&self, entry: &CacheEntry) -> bool {
        self.policy.max_age.is_none_or(|max_age| !entry.is_older_than(max_age))
    }

    /// Evict what the policy no longer allows in `cache`.
    ///
    /// Returns the number of evicted entries.
    pub async fn enforce(&self, db: &CacheDb, cache: CacheName) -> Result<u64, Error> {
        let mut evicted = 0;
        if let Some(max_age) = self.policy.max_age {
            evicted += db.purge_older_than(cache, max_age).await?;
        }
        if let Some(max_entries) = self.policy.max_entries {
            evicted += db.purge_lru(cache, max_entries).await?;
        }
        if evicted > 0 {
            tracing::debug!(cache = %cache, evicted, "expiration enforced");
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::{StatusCode, Url};
    use std::time::Duration;

    fn response(status: StatusCode) -> FetchResponse {
        FetchResponse::synthesized(Url::parse("https://web.dev/a").unwrap(), status, "text/plain", "")
    }

    #[test]
    fn test_default_only_caches_200() {
        let plugin = CacheableResponse::default();
        assert!(plugin.is_cacheable(&response(StatusCode::OK)));
        assert!(!plugin.is_cacheable(&response(StatusCode::NOT_FOUND)));
        assert!(!plugin.is_cacheable(&response(StatusCode::NO_CONTENT)));
    }

    #[test]
    fn test_custom_statuses() {
        let plugin = CacheableResponse::statuses(&[200, 203]);
        assert!(plugin.is_cacheable(&response(StatusCode::NON_AUTHORITATIVE_INFORMATION)));
    }

    #[test]
    fn test_is_fresh_without_max_age() {
        let expiration = Expiration::new(ExpirationPolicy::max_entries(1));
        let entry = CacheEntry { stored_at: "2001-01-01T00:00:00.000000Z".into(), ..CacheEntry::new("u", 200, "") };
        assert!(expiration.is_fresh(&entry));
    }

    #[test]
    fn test_is_fresh_with_max_age() {
        let expiration = Expiration::new(ExpirationPolicy::max_age(Duration::from_secs(60)));
        let old = CacheEntry { stored_at: "2001-01-01T00:00:00.000000Z".into(), ..CacheEntry::new("u", 200, "") };
        assert!(!expiration.is_fresh(&old));
        assert!(expiration.is_fresh(&CacheEntry::new("u", 200, "")));
    }

    #[tokio::test]
    async fn test_enforce_max_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        for i in 0..4 {
            db.put_entry(CacheName::Partials, &CacheEntry::new(format!("https://web.dev/{i}"), 200, ""))
                .await
                .unwrap();
        }

        let expiration = Expiration::new(ExpirationPolicy::max_entries(2));
        assert_eq!(expiration.enforce(&db, CacheName::Partials).await.unwrap(), 2);
        assert_eq!(db.count_entries(CacheName::Partials).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_enforce_unbounded_is_noop() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(CacheName::Core, &CacheEntry::new("https://web.dev/", 200, "")).await.unwrap();
        assert_eq!(Expiration::default().enforce(&db, CacheName::Core).await.unwrap(), 0);
    }
}
