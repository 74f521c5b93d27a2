//! The worker registration record.
//!
//! Tracks whether some worker has already been activated against this database,
//! which is what distinguishes an upgrade from a fresh install.

use chrono::Utc;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::entries::timestamp;
use crate::Error;

/// The currently active worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveWorker {
    pub architecture: String,
    pub activated_at: String,
}

impl CacheDb {
    /// The active worker, if any has ever been activated.
    pub async fn active_worker(&self) -> Result<Option<ActiveWorker>, Error> {
        self.conn
            .call(|conn| -> Result<Option<ActiveWorker>, Error> {
                let result = conn.query_row(
                    "SELECT architecture, activated_at FROM registration WHERE id = 1",
                    [],
                    |row| Ok(ActiveWorker { architecture: row.get(0)?, activated_at: row.get(1)? }),
                );

                match result {
                    Ok(worker) => Ok(Some(worker)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Record the worker running `architecture` as the active one.
    pub async fn set_active_worker(&self, architecture: &str) -> Result<(), Error> {
        let architecture = architecture.to_string();
        let activated_at = timestamp(Utc::now());
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO registration (id, architecture, activated_at) VALUES (1, ?1, ?2)
                    ON CONFLICT(id) DO UPDATE SET
                        architecture = excluded.architecture,
                        activated_at = excluded.activated_at",
                    params![architecture, activated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_active_worker_initially() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.active_worker().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_active_worker_replaces() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.set_active_worker("1").await.unwrap();
        db.set_active_worker("2").await.unwrap();

        let worker = db.active_worker().await.unwrap().unwrap();
        assert_eq!(worker.architecture, "2");
        assert!(!worker.activated_at.is_empty());
    }
}
