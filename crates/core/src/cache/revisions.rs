//! Durable key/value store for revision tags.

use chrono::Utc;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::entries::timestamp;
use crate::Error;

/// The persisted revision tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionKey {
    /// Tag of the most recently activated worker's request-handling architecture.
    Architecture,
    /// Tag of the asset build. Stored but not consulted by activation.
    Resources,
}

impl RevisionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionKey::Architecture => "arch",
            RevisionKey::Resources => "resources",
        }
    }
}

impl CacheDb {
    /// Read a revision tag. Returns None if it was never written.
    pub async fn get_revision(&self, key: RevisionKey) -> Result<Option<String>, Error> {
        let key = key.as_str();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row("SELECT value FROM revisions WHERE key = ?1", params![key], |row| row.get(0));

                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Write a revision tag, replacing any previous value.
    pub async fn set_revision(&self, key: RevisionKey, value: &str) -> Result<(), Error> {
        let key = key.as_str();
        let value = value.to_string();
        let updated_at = timestamp(Utc::now());
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO revisions (key, value, updated_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at",
                    params![key, value, updated_at],
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
    async fn test_missing_revision() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.get_revision(RevisionKey::Architecture).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_and_overwrite_revision() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.set_revision(RevisionKey::Architecture, "1").await.unwrap();
        db.set_revision(RevisionKey::Architecture, "2").await.unwrap();

        let value = db.get_revision(RevisionKey::Architecture).await.unwrap();
        assert_eq!(value.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.set_revision(RevisionKey::Resources, "r9").await.unwrap();

        assert!(db.get_revision(RevisionKey::Architecture).await.unwrap().is_none());
        assert_eq!(db.get_revision(RevisionKey::Resources).await.unwrap().as_deref(), Some("r9"));
    }
}
