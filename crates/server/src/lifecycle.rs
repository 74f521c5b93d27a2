//! Worker lifecycle: install and activate.
//!
//! Install warms the template cache and asks to activate immediately. Activate
//! removes the legacy runtime cache and, when the architecture revision changed,
//! takes over every open client. Open windows are reloaded only when this worker
//! replaces a previous one.

use std::sync::Arc;

use tether_core::{CacheDb, CacheName, Error, RevisionKey};

use crate::runtime::{Clients, Registration};
use crate::templates::TemplateManager;

/// State carried from `install` to `activate` of the same worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallContext {
    /// A worker was already active when this one installed.
    pub replacing_previous: bool,
}

/// What activation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    pub legacy_entries_deleted: u64,
    pub architecture_changed: bool,
    pub clients_claimed: usize,
    pub windows_reloaded: usize,
}

pub struct Lifecycle {
    db: CacheDb,
    templates: TemplateManager,
    registration: Arc<dyn Registration>,
    clients: Arc<dyn Clients>,
    architecture: String,
}

impl Lifecycle {
    pub fn new(
        db: CacheDb, templates: TemplateManager, registration: Arc<dyn Registration>, clients: Arc<dyn Clients>,
        architecture: impl Into<String>,
    ) -> Self {
        Self { db, templates, registration, clients, architecture: architecture.into() }
    }

    pub async fn install(&self) -> Result<InstallContext, Error> {
        let replacing_previous = self.registration.has_active_worker().await?;
        self.templates.refresh().await?;
        self.registration.skip_waiting().await;

        tracing::info!(replacing_previous, architecture = %self.architecture, "worker installed");
        Ok(InstallContext { replacing_previous })
    }

    /// Run both activation actions to completion, then mark this worker active.
    pub async fn activate(&self, context: InstallContext) -> Result<ActivationReport, Error> {
        let (cleanup, sync) = tokio::join!(self.delete_legacy_cache(), self.sync_architecture(context));
        let legacy_entries_deleted = cleanup?;
        let mut report = sync?;
        report.legacy_entries_deleted = legacy_entries_deleted;

        self.registration.mark_active(&self.architecture).await?;
        tracing::info!(
            architecture_changed = report.architecture_changed,
            clients_claimed = report.clients_claimed,
            windows_reloaded = report.windows_reloaded,
            legacy_entries_deleted,
            "worker activated"
        );
        Ok(report)
    }

    async fn delete_legacy_cache(&self) -> Result<u64, Error> {
        self.db.delete_cache(CacheName::LegacyRuntime).await
    }

    async fn sync_architecture(&self, context: InstallContext) -> Result<ActivationReport, Error> {
        let persisted = self.db.get_revision(RevisionKey::Architecture).await?;
        if persisted.as_deref() == Some(self.architecture.as_str()) {
            return Ok(ActivationReport::default());
        }

        tracing::info!(previous = ?persisted, current = %self.architecture, "architecture revision changed");
        self.db.set_revision(RevisionKey::Architecture, &self.architecture).await?;

        let mut report =
            ActivationReport { architecture_changed: true, clients_claimed: self.clients.claim().await, ..Default::default() };

        if context.replacing_previous {
            for window in self.clients.windows(true).await {
                tracing::debug!(client = window.id, controlled = window.controlled, url = %window.url, "reloading window");
                match self.clients.navigate(window.id, &window.url).await {
                    Ok(()) => report.windows_reloaded += 1,
                    Err(err) => tracing::warn!(client = window.id, "reload failed: {err}"),
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fakes::{RecordingClients, RecordingRegistration};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use tether_client::testing::StubNetwork;
    use tether_core::CacheEntry;
    use url::Url;

    const TEMPLATE_URL: &str = "https://web.dev/sw-partial-layout.partial";

    struct Harness {
        db: CacheDb,
        network: Arc<StubNetwork>,
        registration: Arc<RecordingRegistration>,
        clients: Arc<RecordingClients>,
        lifecycle: Lifecycle,
    }

    async fn harness(registration: RecordingRegistration, architecture: &str) -> Harness {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = Arc::new(StubNetwork::new());
        network.json(
            TEMPLATE_URL,
            &json!({
                "template": "<head>%_HEADER_REPLACE_%</head>%_CONTENT_REPLACE_%",
                "manifest": [],
                "resourcesVersion": "r1",
                "builtAt": 1
            }),
        );
        let templates = TemplateManager::new(db.clone(), network.clone(), Url::parse(TEMPLATE_URL).unwrap(), 2);
        let registration = Arc::new(registration);
        let clients = Arc::new(RecordingClients::with_windows(&["/blog/", "/learn/"]));
        let lifecycle = Lifecycle::new(db.clone(), templates, registration.clone(), clients.clone(), architecture);
        Harness { db, network, registration, clients, lifecycle }
    }

    #[tokio::test]
    async fn test_install_refreshes_template_and_skips_waiting() {
        let h = harness(RecordingRegistration::default(), "1").await;
        let context = h.lifecycle.install().await.unwrap();

        assert!(!context.replacing_previous);
        assert!(h.registration.skipped_waiting.load(Ordering::SeqCst));
        assert!(h.db.match_entry(CacheName::Core, TEMPLATE_URL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_install_records_previous_worker() {
        let h = harness(RecordingRegistration::with_previous_worker(), "1").await;
        let context = h.lifecycle.install().await.unwrap();
        assert!(context.replacing_previous);
    }

    #[tokio::test]
    async fn test_install_fails_when_template_unavailable() {
        let h = harness(RecordingRegistration::default(), "1").await;
        h.network.set_offline(true);

        assert!(h.lifecycle.install().await.is_err());
        assert!(!h.registration.skipped_waiting.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_fresh_install_claims_without_reload() {
        let h = harness(RecordingRegistration::default(), "1").await;
        let report = h.lifecycle.activate(InstallContext { replacing_previous: false }).await.unwrap();

        assert!(report.architecture_changed);
        assert_eq!(h.clients.claim_count(), 1);
        assert!(h.clients.navigations().is_empty());
        assert_eq!(h.db.get_revision(RevisionKey::Architecture).await.unwrap().as_deref(), Some("1"));
        assert_eq!(h.registration.activated(), vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn test_unchanged_architecture_never_claims_or_reloads() {
        let h = harness(RecordingRegistration::with_previous_worker(), "1").await;
        h.db.set_revision(RevisionKey::Architecture, "1").await.unwrap();

        let report = h.lifecycle.activate(InstallContext { replacing_previous: true }).await.unwrap();

        assert!(!report.architecture_changed);
        assert_eq!(h.clients.claim_count(), 0);
        assert!(h.clients.navigations().is_empty());
        assert_eq!(h.registration.activated(), vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn test_changed_architecture_on_upgrade_reloads_windows() {
        let h = harness(RecordingRegistration::with_previous_worker(), "2").await;
        h.db.set_revision(RevisionKey::Architecture, "1").await.unwrap();

        let report = h.lifecycle.activate(InstallContext { replacing_previous: true }).await.unwrap();

        assert!(report.architecture_changed);
        assert_eq!(report.windows_reloaded, 2);
        assert_eq!(h.clients.claim_count(), 1);
        assert_eq!(h.clients.navigations(), vec![(0, "/blog/".to_string()), (1, "/learn/".to_string())]);
        assert_eq!(h.db.get_revision(RevisionKey::Architecture).await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_activate_deletes_legacy_cache() {
        let h = harness(RecordingRegistration::default(), "1").await;
        h.db.put_entry(CacheName::LegacyRuntime, &CacheEntry::new("https://web.dev/old/", 200, "old"))
            .await
            .unwrap();
        h.db.set_revision(RevisionKey::Architecture, "1").await.unwrap();

        let report = h.lifecycle.activate(InstallContext { replacing_previous: false }).await.unwrap();

        assert_eq!(report.legacy_entries_deleted, 1);
        assert_eq!(h.db.count_entries(CacheName::LegacyRuntime).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_install_then_activate_round() {
        let h = harness(RecordingRegistration::default(), "1").await;
        let context = h.lifecycle.install().await.unwrap();
        h.lifecycle.activate(context).await.unwrap();

        let upgrade = harness(RecordingRegistration::default(), "2").await;
        let next = Lifecycle::new(
            h.db.clone(),
            TemplateManager::new(h.db.clone(), upgrade.network.clone(), Url::parse(TEMPLATE_URL).unwrap(), 2),
            h.registration.clone(),
            upgrade.clients.clone(),
            "2",
        );
        let context = next.install().await.unwrap();
        assert!(context.replacing_previous);

        let report = next.activate(context).await.unwrap();
        assert_eq!(report.windows_reloaded, 2);
    }
}
