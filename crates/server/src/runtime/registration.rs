//! Registration record backed by the cache database.

use async_trait::async_trait;
use tether_core::{CacheDb, Error};

use super::Registration;

/// There is only ever one worker per process, so nothing waits on a skip; only
/// the active record is persisted.
pub struct PersistedRegistration {
    db: CacheDb,
}

impl PersistedRegistration {
    pub fn new(db: CacheDb) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Registration for PersistedRegistration {
    async fn has_active_worker(&self) -> Result<bool, Error> {
        Ok(self.db.active_worker().await?.is_some())
    }

    async fn skip_waiting(&self) {
        tracing::debug!("worker will activate without waiting for clients");
    }

    async fn mark_active(&self, architecture: &str) -> Result<(), Error> {
        self.db.set_active_worker(architecture).await?;
        tracing::info!(architecture, "worker active");
        Ok(())
    }
}
