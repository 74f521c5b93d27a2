//! The offline partial served when a partial cannot be fetched or found in cache.

use axum::http::StatusCode;
use tether_client::FetchResponse;
use tether_core::{CacheDb, CacheName, Error, Partial};
use url::Url;

#[derive(Clone)]
pub struct OfflineFallback {
    db: CacheDb,
    url: Url,
}

impl OfflineFallback {
    /// `url` is where the build precaches the offline partial in the core cache.
    pub fn new(db: CacheDb, url: Url) -> Self {
        Self { db, url }
    }

    /// The precached offline partial, or the dev stand-in when it was never precached.
    ///
    /// Never fails: cache read errors also yield the stand-in.
    pub async fn partial_response(&self) -> FetchResponse {
        match self.precached().await {
            Ok(response) => return response,
            Err(err @ Error::CacheMiss(_)) => tracing::debug!("serving dev offline partial: {err}"),
            Err(err) => tracing::warn!(url = %self.url, "offline partial unavailable: {err}"),
        }

        let body = serde_json::to_vec(&Partial::dev_offline()).unwrap_or_default();
        FetchResponse::synthesized(self.url.clone(), StatusCode::OK, "application/json", body)
    }

    async fn precached(&self) -> Result<FetchResponse, Error> {
        let entry = self
            .db
            .match_entry(CacheName::Core, self.url.as_str())
            .await?
            .ok_or_else(|| Error::CacheMiss(format!("{} was never precached", self.url)))?;
        FetchResponse::from_cache_entry(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_client::ResponseSource;
    use tether_core::CacheEntry;

    const OFFLINE: &str = "https://web.dev/offline/index.json";

    #[tokio::test]
    async fn test_precached_partial_returned_as_is() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let body = r#"{"raw":"<h1>You are offline</h1>","title":"Offline","offline":true}"#;
        db.put_entry(CacheName::Core, &CacheEntry::new(OFFLINE, 200, body).with_content_type("application/json"))
            .await
            .unwrap();

        let fallback = OfflineFallback::new(db, Url::parse(OFFLINE).unwrap());
        let response = fallback.partial_response().await;

        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.text(), body);
    }

    #[tokio::test]
    async fn test_absent_partial_is_cache_miss() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let fallback = OfflineFallback::new(db, Url::parse(OFFLINE).unwrap());
        let err = fallback.precached().await.unwrap_err();
        assert_eq!(err.code(), "CACHE_MISS");
    }

    #[tokio::test]
    async fn test_dev_stand_in_when_absent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let fallback = OfflineFallback::new(db, Url::parse(OFFLINE).unwrap());
        let response = fallback.partial_response().await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type(), Some("application/json"));
        let partial: Partial = serde_json::from_slice(&response.bytes).unwrap();
        assert!(partial.offline);
        assert_eq!(partial.raw, "<h1>Dev offline</h1>");
        assert_eq!(partial.title.as_deref(), Some(""));
    }
}
