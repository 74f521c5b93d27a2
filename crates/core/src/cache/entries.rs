//! Named cache entry operations.
//!
//! Each row is one stored response for one URL inside one named cache. Writes use
//! UPSERT semantics, so concurrent writers to the same key resolve last-writer-wins.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::hash::compute_cache_key;
use super::names::CacheName;
use crate::Error;

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    /// Response headers as a JSON array of `[name, value]` pairs.
    pub headers_json: Option<String>,
    pub body: Vec<u8>,
    /// RFC 3339 timestamp (UTC, microsecond precision) of the write.
    pub stored_at: String,
}

impl CacheEntry {
    /// Create an entry stamped with the current time.
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status,
            content_type: None,
            headers_json: None,
            body: body.into(),
            stored_at: timestamp(Utc::now()),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_headers_json(mut self, headers_json: impl Into<String>) -> Self {
        self.headers_json = Some(headers_json.into());
        self
    }

    /// Whether the entry was stored more than `max_age` ago.
    ///
    /// Entries with an unreadable timestamp count as expired.
    pub fn is_older_than(&self, max_age: Duration) -> bool {
        let Ok(stored_at) = DateTime::parse_from_rfc3339(&self.stored_at) else {
            return true;
        };
        let age = Utc::now().signed_duration_since(stored_at.with_timezone(&Utc));
        age.to_std().map(|age| age > max_age).unwrap_or(false)
    }
}

/// Format a timestamp so that lexical order equals chronological order.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl CacheDb {
    /// Store `entry` in `cache`, replacing any previous entry for the same URL.
    pub async fn put_entry(&self, cache: CacheName, entry: &CacheEntry) -> Result<(), Error> {
        let key = compute_cache_key(cache.as_str(), &entry.url);
        let cache_name = cache.as_str();
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO cache_entries (
                    key, cache_name, url, status, content_type, headers_json, body, stored_at, last_used
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                          (SELECT COALESCE(MAX(last_used), 0) + 1 FROM cache_entries))
                ON CONFLICT(key) DO UPDATE SET
                    status = excluded.status,
                    content_type = excluded.content_type,
                    headers_json = excluded.headers_json,
                    body = excluded.body,
                    stored_at = excluded.stored_at,
                    last_used = excluded.last_used",
                    params![
                        key,
                        cache_name,
                        &entry.url,
                        entry.status,
                        &entry.content_type,
                        &entry.headers_json,
                        &entry.body,
                        &entry.stored_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the entry for `url` in `cache`, marking it as recently used.
    ///
    /// Returns None if the cache holds nothing for the URL.
    pub async fn match_entry(&self, cache: CacheName, url: &str) -> Result<Option<CacheEntry>, Error> {
        let key = compute_cache_key(cache.as_str(), url);
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let result = conn.query_row(
                    "SELECT url, status, content_type, headers_json, body, stored_at
                    FROM cache_entries WHERE key = ?1",
                    params![key],
                    |row| {
                        Ok(CacheEntry {
                            url: row.get(0)?,
                            status: row.get(1)?,
                            content_type: row.get(2)?,
                            headers_json: row.get(3)?,
                            body: row.get(4)?,
                            stored_at: row.get(5)?,
                        })
                    },
                );

                let entry = match result {
                    Ok(entry) => entry,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };

                conn.execute(
                    "UPDATE cache_entries
                    SET last_used = (SELECT COALESCE(MAX(last_used), 0) + 1 FROM cache_entries)
                    WHERE key = ?1",
                    params![key],
                )?;

                Ok(Some(entry))
            })
            .await
            .map_err(Error::from)
    }

    /// Delete the entry for `url` in `cache`.
    ///
    /// Returns whether an entry existed.
    pub async fn delete_entry(&self, cache: CacheName, url: &str) -> Result<bool, Error> {
        let key = compute_cache_key(cache.as_str(), url);
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a whole named cache.
    ///
    /// Returns the number of deleted entries.
    pub async fn delete_cache(&self, cache: CacheName) -> Result<u64, Error> {
        let cache_name = cache.as_str();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM cache_entries WHERE cache_name = ?1", params![cache_name])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries currently held by `cache`.
    pub async fn count_entries(&self, cache: CacheName) -> Result<u64, Error> {
        let cache_name = cache.as_str();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE cache_name = ?1",
                    params![cache_name],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries of `cache` stored more than `max_age` ago.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_older_than(&self, cache: CacheName, max_age: Duration) -> Result<u64, Error> {
        let cache_name = cache.as_str();
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now().checked_sub_signed(max_age).map(timestamp).unwrap_or_default();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM cache_entries WHERE cache_name = ?1 AND stored_at < ?2",
                    params![cache_name, cutoff],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Purge least-recently-used entries of `cache` until count <= max_entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_lru(&self, cache: CacheName, max_entries: usize) -> Result<u64, Error> {
        let cache_name = cache.as_str();
        let max = max_entries as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE cache_name = ?1",
                    params![cache_name],
                    |row| row.get(0),
                )?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM cache_entries WHERE key IN (
                    SELECT key FROM cache_entries WHERE cache_name = ?1 ORDER BY last_used ASC LIMIT ?2
                )",
                    params![cache_name, to_delete],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}
