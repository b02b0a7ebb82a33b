//! The chat store contract.
//!
//! The host application owns the chat store; this crate only reads the
//! conversation index and message lists, rewrites message lists and deletes
//! blobs. [`ChatStore`] is that surface, [`CacheDb`](crate::CacheDb)
//! implements it over SQLite.

pub mod estimate;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::Error;

pub use estimate::{DbEstimator, StorageEstimate, StorageEstimator};

/// Scheme prefix of attachment references that point into the blob table.
pub const BLOB_SCHEME: &str = "blob:";

/// Which side of the index a conversation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    /// One-to-one chat with a character, keyed by character id.
    Private,
    /// Group chat, keyed by group id.
    Group,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Private => "private",
            ConversationKind::Group => "group",
        }
    }
}

impl std::fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry of the `characters` or `groups` array.
///
/// Only the id matters here; every other field of the entry is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRef {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
}

/// Ids are written by the host as strings or numbers.
fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unsupported conversation id: {other}"))),
    }
}

/// Every conversation known to the host, read from one named document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationIndex {
    #[serde(default)]
    pub characters: Vec<ConversationRef>,
    #[serde(default)]
    pub groups: Vec<ConversationRef>,
}

impl ConversationIndex {
    /// All conversations, private ones first.
    pub fn conversations(&self) -> impl Iterator<Item = (&str, ConversationKind)> + '_ {
        let private = self
            .characters
            .iter()
            .map(|c| (c.id.as_str(), ConversationKind::Private));
        let group = self.groups.iter().map(|g| (g.id.as_str(), ConversationKind::Group));
        private.chain(group)
    }

    pub fn len(&self) -> usize {
        self.characters.len() + self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One chat message.
///
/// Only the attachment reference is interpreted. The remaining fields are
/// carried through untouched so rewriting a message list never loses data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl ChatMessage {
    /// Id of the referenced blob, if the attachment points into the blob table.
    pub fn blob_id(&self) -> Option<&str> {
        self.image.as_deref()?.strip_prefix(BLOB_SCHEME)
    }
}

/// Persistent store shared with the host application.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Fetch a named document, `None` if it was never written.
    async fn get_document(&self, name: &str) -> Result<Option<Value>, Error>;

    /// Message list of a conversation, oldest first. Unknown conversations are empty.
    async fn get_messages(&self, conversation_id: &str, kind: ConversationKind) -> Result<Vec<ChatMessage>, Error>;

    /// Replace the message list of a conversation in one write.
    async fn save_messages(
        &self, conversation_id: &str, kind: ConversationKind, messages: &[ChatMessage],
    ) -> Result<(), Error>;

    /// Ids of every stored blob.
    async fn list_blob_ids(&self) -> Result<Vec<String>, Error>;

    /// Delete the given blobs in one batch. Returns how many rows went away.
    async fn bulk_delete_blobs(&self, ids: &[String]) -> Result<u64, Error>;
}

/// Read the conversation index document.
///
/// A missing document is an empty index; a malformed one is an error.
pub async fn load_index(store: &dyn ChatStore, name: &str) -> Result<ConversationIndex, Error> {
    match store.get_document(name).await? {
        Some(Value::Null) | None => Ok(ConversationIndex::default()),
        Some(doc) => Ok(serde_json::from_value(doc)?),
    }
}
