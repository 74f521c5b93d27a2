//! Template cache manager.
//!
//! Owns the single template record in the core cache. A refresh fetches the
//! template document from the origin, persists it without its manifest, and
//! precaches every manifest URL with bounded concurrency.

use std::sync::Arc;

use tether_client::fetch::resolve;
use tether_client::{Network, Request};
use tether_core::{CacheDb, CacheEntry, CacheName, Error, ManifestEntry, Partial, TemplateBundle, TemplateDocument};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

use crate::template::PageTemplate;

/// Outcome of precaching a manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrecacheReport {
    pub stored: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct TemplateManager {
    db: CacheDb,
    network: Arc<dyn Network>,
    template_url: Url,
    concurrency: usize,
}

impl TemplateManager {
    pub fn new(db: CacheDb, network: Arc<dyn Network>, template_url: Url, concurrency: usize) -> Self {
        Self { db, network, template_url, concurrency: concurrency.max(1) }
    }

    /// The persisted template record, if any.
    ///
    /// An unreadable record counts as absent.
    pub async fn cached(&self) -> Option<TemplateBundle> {
        let entry = match self.db.match_entry(CacheName::Core, self.template_url.as_str()).await {
            Ok(entry) => entry?,
            Err(err) => {
                tracing::warn!(url = %self.template_url, "template lookup failed: {err}");
                return None;
            }
        };

        match serde_json::from_slice(&entry.body) {
            Ok(bundle) => Some(bundle),
            Err(err) => {
                tracing::warn!(url = %self.template_url, "discarding unreadable template record: {err}");
                None
            }
        }
    }

    /// The template to render `partial` with.
    ///
    /// Serves the cached template when it matches the partial's resources version or
    /// was built after it; otherwise refreshes, falling back to the cached template
    /// if the refresh fails.
    pub async fn resolve_for(&self, partial: &Partial) -> Result<String, Error> {
        let cached = self.cached().await;
        if let Some(bundle) = &cached
            && bundle.is_current_for(partial)
        {
            return Ok(bundle.template.clone());
        }

        match self.refresh().await {
            Ok(template) => Ok(template),
            Err(err) => match cached {
                Some(bundle) => {
                    tracing::warn!("template refresh failed, using cached template: {err}");
                    Ok(bundle.template)
                }
                None => Err(err),
            },
        }
    }

    /// Fetch the template document, persist it and precache its manifest.
    ///
    /// Concurrent refreshes are safe; the last write wins.
    pub async fn refresh(&self) -> Result<String, Error> {
        let response = self.network.fetch(&Request::get(self.template_url.clone())).await?;
        if !response.is_ok() {
            return Err(Error::UnexpectedStatus { status: response.status.as_u16(), url: self.template_url.to_string() });
        }

        let document: TemplateDocument = serde_json::from_slice(&response.bytes)?;
        PageTemplate::parse(&document.template)?;

        let (bundle, manifest) = document.into_parts();
        let record = serde_json::to_vec(&bundle)?;
        let entry = CacheEntry::new(self.template_url.as_str(), 200, record).with_content_type("application/json");
        self.db.put_entry(CacheName::Core, &entry).await?;

        tracing::info!(
            resources_version = %bundle.resources_version,
            built_at = bundle.built_at,
            manifest = manifest.len(),
            "template refreshed"
        );

        let report = self.precache(manifest).await;
        if report.failed > 0 {
            tracing::warn!(stored = report.stored, failed = report.failed, "precache incomplete");
        }

        Ok(bundle.template)
    }

    /// Store every manifest URL in the core cache. Failures are logged and skipped.
    async fn precache(&self, manifest: Vec<ManifestEntry>) -> PrecacheReport {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();
        let mut report = PrecacheReport::default();

        for ManifestEntry { url } in manifest {
            let target = match resolve(&self.template_url, &url) {
                Ok(target) => target,
                Err(err) => {
                    tracing::warn!(%url, "skipping manifest entry: {err}");
                    report.failed += 1;
                    continue;
                }
            };

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let db = self.db.clone();
            let network = self.network.clone();

            join_set.spawn(async move {
                let _permit = permit;
                let result = precache_one(&db, network.as_ref(), target.clone()).await;
                (target, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.stored += 1,
                Ok((url, Err(err))) => {
                    tracing::warn!(%url, "precache failed: {err}");
                    report.failed += 1;
                }
                Err(err) => {
                    tracing::warn!("precache task failed: {err}");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

async fn precache_one(db: &CacheDb, network: &dyn Network, url: Url) -> Result<(), Error> {
    let response = network.fetch(&Request::get(url.clone())).await?;
    if !response.is_ok() {
        return Err(Error::UnexpectedStatus { status: response.status.as_u16(), url: url.to_string() });
    }
    db.put_entry(CacheName::Core, &response.to_cache_entry()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_client::testing::StubNetwork;

    const TEMPLATE_URL: &str = "https://web.dev/sw-partial-layout.partial";
    const TEMPLATE: &str = "<html><head>%_HEADER_REPLACE_%</head><body>%_CONTENT_REPLACE_%</body></html>";

    async fn setup() -> (CacheDb, Arc<StubNetwork>, TemplateManager) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = Arc::new(StubNetwork::new());
        let manager = TemplateManager::new(db.clone(), network.clone(), Url::parse(TEMPLATE_URL).unwrap(), 2);
        (db, network, manager)
    }

    async fn seed(db: &CacheDb, template: &str, resources_version: &str, built_at: i64) {
        let bundle = TemplateBundle { template: template.into(), resources_version: resources_version.into(), built_at };
        let entry = CacheEntry::new(TEMPLATE_URL, 200, serde_json::to_vec(&bundle).unwrap());
        db.put_entry(CacheName::Core, &entry).await.unwrap();
    }

    fn partial(resources_version: &str, built_at: i64) -> Partial {
        Partial {
            raw: "<p>hi</p>".into(),
            title: Some("Hi".into()),
            resources_version: Some(resources_version.into()),
            built_at: Some(built_at),
            ..Default::default()
        }
    }

    fn document(template: &str, manifest: &[&str], resources_version: &str, built_at: i64) -> serde_json::Value {
        let manifest: Vec<_> = manifest.iter().map(|url| json!({ "url": url })).collect();
        json!({ "template": template, "manifest": manifest, "resourcesVersion": resources_version, "builtAt": built_at })
    }

    #[tokio::test]
    async fn test_refresh_persists_without_manifest_and_precaches() {
        let (db, network, manager) = setup().await;
        network.json(TEMPLATE_URL, &document(TEMPLATE, &["/css/main.css", "/offline/index.json"], "r2", 20));
        network.respond("https://web.dev/css/main.css", 200, "text/css", "body{}");
        network.respond("https://web.dev/offline/index.json", 200, "application/json", r#"{"offline":true}"#);

        let template = manager.refresh().await.unwrap();
        assert_eq!(template, TEMPLATE);

        let stored = db.match_entry(CacheName::Core, TEMPLATE_URL).await.unwrap().unwrap();
        let record: serde_json::Value = serde_json::from_slice(&stored.body).unwrap();
        assert!(record.get("manifest").is_none());
        assert_eq!(record["resourcesVersion"], "r2");

        assert!(db.match_entry(CacheName::Core, "https://web.dev/css/main.css").await.unwrap().is_some());
        assert!(db.match_entry(CacheName::Core, "https://web.dev/offline/index.json").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_leave_one_record() {
        let (db, network, manager) = setup().await;
        network.json(TEMPLATE_URL, &document(TEMPLATE, &[], "r3", 30));
        let other = manager.clone();

        let (first, second) = tokio::join!(manager.refresh(), other.refresh());
        assert_eq!(first.unwrap(), TEMPLATE);
        assert_eq!(second.unwrap(), TEMPLATE);

        assert_eq!(db.count_entries(CacheName::Core).await.unwrap(), 1);
        let stored = db.match_entry(CacheName::Core, TEMPLATE_URL).await.unwrap().unwrap();
        let record: serde_json::Value = serde_json::from_slice(&stored.body).unwrap();
        assert!(record.get("manifest").is_none());
        let bundle: TemplateBundle = serde_json::from_value(record).unwrap();
        assert_eq!(bundle.resources_version, "r3");
        assert_eq!(bundle.built_at, 30);
    }

    #[tokio::test]
    async fn test_precache_failures_do_not_fail_refresh() {
        let (db, network, manager) = setup().await;
        network.json(TEMPLATE_URL, &document(TEMPLATE, &["/a.js", "/b.js"], "r1", 1));
        network.respond("https://web.dev/a.js", 200, "text/javascript", "a");
        network.fail("https://web.dev/b.js");

        assert!(manager.refresh().await.is_ok());
        assert_eq!(db.count_entries(CacheName::Core).await.unwrap(), 2);

        let report = manager.precache(vec![ManifestEntry { url: "/b.js".into() }]).await;
        assert_eq!(report, PrecacheReport { stored: 0, failed: 1 });
    }

    #[tokio::test]
    async fn test_refresh_rejects_malformed_template() {
        let (db, network, manager) = setup().await;
        network.json(TEMPLATE_URL, &document("<html>%_CONTENT_REPLACE_%</html>", &[], "r1", 1));

        let err = manager.refresh().await.unwrap_err();
        assert!(matches!(err, Error::MalformedTemplate(_)));
        assert!(db.match_entry(CacheName::Core, TEMPLATE_URL).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_non_ok_status_errors() {
        let (_db, network, manager) = setup().await;
        network.respond(TEMPLATE_URL, 500, "text/plain", "boom");

        let err = manager.refresh().await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_resolve_matching_resources_version_skips_refresh() {
        let (db, network, manager) = setup().await;
        seed(&db, "cached", "r1", 1).await;
        network.json(TEMPLATE_URL, &document(TEMPLATE, &[], "r9", 99));

        let template = manager.resolve_for(&partial("r1", 50)).await.unwrap();
        assert_eq!(template, "cached");
        assert_eq!(network.call_count(TEMPLATE_URL), 0);
    }

    #[tokio::test]
    async fn test_resolve_newer_cached_template_skips_refresh() {
        let (db, network, manager) = setup().await;
        seed(&db, "cached", "r1", 10).await;

        let template = manager.resolve_for(&partial("r0", 5)).await.unwrap();
        assert_eq!(template, "cached");
        assert!(network.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_older_cached_template_refreshes() {
        let (db, network, manager) = setup().await;
        seed(&db, "cached", "r1", 10).await;
        network.json(TEMPLATE_URL, &document(TEMPLATE, &[], "r2", 30));

        let template = manager.resolve_for(&partial("r2", 20)).await.unwrap();
        assert_eq!(template, TEMPLATE);
        assert_eq!(manager.cached().await.unwrap().resources_version, "r2");
    }

    #[tokio::test]
    async fn test_resolve_dev_template_always_refreshes() {
        let (db, network, manager) = setup().await;
        seed(&db, "cached", "", 100).await;
        network.json(TEMPLATE_URL, &document(TEMPLATE, &[], "", 100));

        manager.resolve_for(&partial("", 1)).await.unwrap();
        assert_eq!(network.call_count(TEMPLATE_URL), 1);
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_cached_when_refresh_fails() {
        let (db, network, manager) = setup().await;
        seed(&db, "cached", "r1", 10).await;
        network.set_offline(true);

        let template = manager.resolve_for(&partial("r2", 20)).await.unwrap();
        assert_eq!(template, "cached");
    }

    #[tokio::test]
    async fn test_resolve_without_cache_propagates_refresh_failure() {
        let (_db, network, manager) = setup().await;
        network.set_offline(true);

        let err = manager.resolve_for(&partial("r1", 1)).await.unwrap_err();
        assert!(err.is_network_failure());
    }
}
