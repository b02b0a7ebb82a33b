//! Bucket operations.
//!
//! A bucket is a named set of stored GET responses. Opening a bucket creates
//! it on demand; deleting one drops all of its entries through the foreign
//! key cascade. Writes never create a bucket, so a deleted bucket stays gone.

use super::connection::CacheDb;
use super::hash::compute_request_key;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// URL the response is keyed by.
    pub url: String,
    pub status_code: u16,
    /// Header pairs in their original order.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: String,
}

impl CachedResponse {
    /// First value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

type EntryRow = (String, u16, String, Vec<u8>, String);

fn read_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_entry((url, status_code, headers_json, body, stored_at): EntryRow) -> Result<CachedResponse, Error> {
    let headers = serde_json::from_str(&headers_json)?;
    Ok(CachedResponse { url, status_code, headers, body, stored_at })
}

/// Handle to one named bucket.
#[derive(Clone, Debug)]
pub struct Bucket {
    db: CacheDb,
    name: String,
}

impl CacheDb {
    /// Handle to the named bucket without touching the database.
    ///
    /// Writes through the handle are dropped unless the bucket has been opened.
    pub fn bucket(&self, name: &str) -> Bucket {
        Bucket { db: self.clone(), name: name.to_string() }
    }

    /// Open the named bucket, creating it if it does not exist yet.
    pub async fn open_bucket(&self, name: &str) -> Result<Bucket, Error> {
        let bucket = self.bucket(name);
        bucket.ensure_exists().await?;
        Ok(bucket)
    }

    /// Names of all buckets, oldest first.
    pub async fn bucket_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_buckets ORDER BY rowid ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a bucket and every entry in it.
    ///
    /// Returns false if no bucket had that name.
    pub async fn delete_bucket(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM cache_buckets WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Look a GET request up across every bucket.
    ///
    /// Buckets are searched in creation order and the first hit wins.
    pub async fn match_any(&self, url: &str) -> Result<Option<CachedResponse>, Error> {
        let key_hash = compute_request_key("GET", url);
        self.conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT e.url, e.status_code, e.headers_json, e.body, e.stored_at
                     FROM cache_entries e
                     JOIN cache_buckets b ON b.name = e.bucket
                     WHERE e.key_hash = ?1
                     ORDER BY b.rowid ASC
                     LIMIT 1",
                )?;

                match stmt.query_row(params![key_hash], read_entry) {
                    Ok(row) => decode_entry(row).map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }
}

impl Bucket {
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_exists(&self) -> Result<(), Error> {
        let name = self.name.clone();
        let now = chrono::Utc::now().to_rfc3339();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO cache_buckets (name, created_at) VALUES (?1, ?2)",
                    params![name, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Store a response, replacing any previous entry for the same URL.
    ///
    /// Returns false, storing nothing, when the bucket does not exist.
    pub async fn put(&self, response: &CachedResponse) -> Result<bool, Error> {
        let name = self.name.clone();
        let key_hash = compute_request_key("GET", &response.url);
        let headers_json = serde_json::to_string(&response.headers)?;
        let response = response.clone();

        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let written = conn.execute(
                    "INSERT INTO cache_entries (bucket, key_hash, url, status_code, headers_json, body, stored_at)
                    SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
                    WHERE EXISTS (SELECT 1 FROM cache_buckets WHERE name = ?1)
                    ON CONFLICT(bucket, key_hash) DO UPDATE SET
                        url = excluded.url,
                        status_code = excluded.status_code,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![
                        name,
                        key_hash,
                        response.url,
                        response.status_code,
                        headers_json,
                        response.body,
                        response.stored_at
                    ],
                )?;
                Ok(written > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Look a GET request up in this bucket only.
    pub async fn match_url(&self, url: &str) -> Result<Option<CachedResponse>, Error> {
        let name = self.name.clone();
        let key_hash = compute_request_key("GET", url);
        self.db
            .conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, status_code, headers_json, body, stored_at
                     FROM cache_entries WHERE bucket = ?1 AND key_hash = ?2",
                )?;

                match stmt.query_row(params![name, key_hash], read_entry) {
                    Ok(row) => decode_entry(row).map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in the bucket.
    pub async fn entry_count(&self) -> Result<u64, Error> {
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM cache_entries WHERE bucket = ?1", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
