//! [`ChatStore`] over the shared SQLite database.
//!
//! Message lists are stored as one JSON array per conversation, so a save
//! is always a whole-list overwrite.

use async_trait::async_trait;
use serde_json::Value;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::{ChatMessage, ChatStore, ConversationKind};
use crate::{CacheDb, Error};

impl CacheDb {
    /// Insert or replace a named document.
    pub async fn put_document(&self, name: &str, body: &Value) -> Result<(), Error> {
        let name = name.to_string();
        let body_json = serde_json::to_string(body)?;
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO documents (name, body_json, updated_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(name) DO UPDATE SET
                        body_json = excluded.body_json,
                        updated_at = excluded.updated_at",
                    params![name, body_json, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace a blob.
    pub async fn put_blob(&self, id: &str, mime_type: Option<&str>, data: &[u8]) -> Result<(), Error> {
        let id = id.to_string();
        let mime_type = mime_type.map(str::to_string);
        let data = data.to_vec();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO blobs (id, mime_type, data, created_at) VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(id) DO UPDATE SET
                        mime_type = excluded.mime_type,
                        data = excluded.data",
                    params![id, mime_type, data, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl ChatStore for CacheDb {
    async fn get_document(&self, name: &str) -> Result<Option<Value>, Error> {
        let name = name.to_string();
        let body: Option<String> = self
            .conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row("SELECT body_json FROM documents WHERE name = ?1", params![name], |row| {
                    row.get(0)
                });
                match result {
                    Ok(json) => Ok(Some(json)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        body.map(|json| serde_json::from_str(&json).map_err(Error::from))
            .transpose()
    }

    async fn get_messages(&self, conversation_id: &str, kind: ConversationKind) -> Result<Vec<ChatMessage>, Error> {
        let conversation_id = conversation_id.to_string();
        let messages_json: Option<String> = self
            .conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row(
                    "SELECT messages_json FROM conversations WHERE conversation_id = ?1 AND kind = ?2",
                    params![conversation_id, kind.as_str()],
                    |row| row.get(0),
                );
                match result {
                    Ok(json) => Ok(Some(json)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        match messages_json {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save_messages(
        &self, conversation_id: &str, kind: ConversationKind, messages: &[ChatMessage],
    ) -> Result<(), Error> {
        let conversation_id = conversation_id.to_string();
        let messages_json = serde_json::to_string(messages)?;
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO conversations (conversation_id, kind, messages_json, updated_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(conversation_id, kind) DO UPDATE SET
                        messages_json = excluded.messages_json,
                        updated_at = excluded.updated_at",
                    params![conversation_id, kind.as_str(), messages_json, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn list_blob_ids(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT id FROM blobs ORDER BY id")?;
                let ids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(ids)
            })
            .await
            .map_err(Error::from)
    }

    async fn bulk_delete_blobs(&self, ids: &[String]) -> Result<u64, Error> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.unchecked_transaction()?;
                let mut deleted = 0u64;
                {
                    let mut stmt = tx.prepare("DELETE FROM blobs WHERE id = ?1")?;
                    for id in &ids {
                        deleted += stmt.execute(params![id])? as u64;
                    }
                }
                tx.commit()?;
                Ok(deleted)
            })
            .await
            .map_err(Error::from)
    }
}
