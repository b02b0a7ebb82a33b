//! Storage reclamation for the chat store.
//!
//! The reclaimer watches usage against quota and, when asked, frees space in
//! two phases: blobs that no message references anymore are deleted, then
//! every conversation longer than the cap is cut down to its newest
//! messages.
//!
//! Eviction runs before compression. Blobs that compression orphans are
//! therefore only reclaimed on the following cycle.
//!
//! Every public operation is fail-soft: errors are logged and reported as
//! "nothing happened" so a maintenance pass can never take the host down.
//!
//! Cleanups are serialized: eviction, compression and full cleanups of one
//! reclaimer (and all of its clones) never overlap.

use std::collections::HashSet;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::store::{ChatStore, StorageEstimator, load_index};
use crate::{AppConfig, Error};

/// Tunables of the reclaimer.
#[derive(Debug, Clone, PartialEq)]
pub struct ReclaimerConfig {
    /// Usage ratio above which storage is unhealthy.
    pub warning_threshold: f64,
    /// Messages kept per conversation by a full cleanup.
    pub max_messages_per_chat: usize,
    /// Document holding the `characters` and `groups` arrays.
    pub index_document: String,
}

impl Default for ReclaimerConfig {
    fn default() -> Self {
        Self { warning_threshold: 0.8, max_messages_per_chat: 500, index_document: "chat-app".into() }
    }
}

impl From<&AppConfig> for ReclaimerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            warning_threshold: config.warning_threshold,
            max_messages_per_chat: config.max_messages_per_chat,
            index_document: config.index_document.clone(),
        }
    }
}

/// Usage snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StorageUsage {
    pub usage: u64,
    pub quota: u64,
    /// `usage / quota`, 0 when the quota is unknown.
    pub percentage: f64,
}

/// Outcome of a full cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CleanupReport {
    pub deleted_images: usize,
    pub deleted_messages: usize,
    /// Usage before minus usage after. Can be zero or negative when freed
    /// pages are not returned yet or the host wrote in between.
    pub saved_space: i64,
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

/// Quota monitor and cleanup engine.
#[derive(Clone)]
pub struct StorageReclaimer {
    store: Arc<dyn ChatStore>,
    estimator: Arc<dyn StorageEstimator>,
    config: ReclaimerConfig,
    cleanup_lock: Arc<Mutex<()>>,
}

impl StorageReclaimer {
    pub fn new(store: Arc<dyn ChatStore>, estimator: Arc<dyn StorageEstimator>, config: ReclaimerConfig) -> Self {
        Self { store, estimator, config, cleanup_lock: Arc::new(Mutex::new(())) }
    }

    pub fn config(&self) -> &ReclaimerConfig {
        &self.config
    }

    /// Same store, estimator and cleanup lock, different compression cap.
    pub fn with_max_messages_per_chat(&self, max_messages_per_chat: usize) -> Self {
        let config = ReclaimerConfig { max_messages_per_chat, ..self.config.clone() };
        Self {
            store: Arc::clone(&self.store),
            estimator: Arc::clone(&self.estimator),
            config,
            cleanup_lock: Arc::clone(&self.cleanup_lock),
        }
    }

    /// Current usage and quota. Never fails; an unavailable estimate reads as all zeros.
    pub async fn calculate_storage_size(&self) -> StorageUsage {
        match self.estimator.estimate().await {
            Ok(estimate) => {
                let percentage =
                    if estimate.quota == 0 { 0.0 } else { estimate.usage as f64 / estimate.quota as f64 };
                tracing::info!(
                    usage_mb = %format!("{:.2}", megabytes(estimate.usage)),
                    quota_mb = %format!("{:.2}", megabytes(estimate.quota)),
                    "storage usage"
                );
                StorageUsage { usage: estimate.usage, quota: estimate.quota, percentage }
            }
            Err(e) => {
                tracing::warn!(error = %e, "storage estimate unavailable");
                StorageUsage::default()
            }
        }
    }

    /// False once usage exceeds the warning threshold.
    ///
    /// Only reports; the caller decides whether to clean up.
    pub async fn check_storage(&self) -> bool {
        let usage = self.calculate_storage_size().await;
        self.is_healthy(&usage)
    }

    /// Whether a usage snapshot is at or below the warning threshold.
    pub fn is_healthy(&self, usage: &StorageUsage) -> bool {
        if usage.percentage > self.config.warning_threshold {
            tracing::warn!(
                percentage = %format!("{:.1}", usage.percentage * 100.0),
                threshold = self.config.warning_threshold,
                "storage nearly full"
            );
            return false;
        }
        true
    }

    /// Delete every blob no message references. Returns how many were deleted.
    pub async fn cleanup_unused_images(&self) -> usize {
        let _guard = self.cleanup_lock.lock().await;
        self.run_eviction().await
    }

    async fn run_eviction(&self) -> usize {
        tracing::info!("cleaning up unused images");
        match self.evict_orphaned_blobs().await {
            Ok(0) => {
                tracing::info!("no unused images");
                0
            }
            Ok(deleted) => {
                tracing::info!(deleted, "deleted unused images");
                deleted
            }
            Err(e) => {
                tracing::error!(error = %e, "image cleanup failed");
                0
            }
        }
    }

    async fn evict_orphaned_blobs(&self) -> Result<usize, Error> {
        let all_ids = self.store.list_blob_ids().await?;
        if all_ids.is_empty() {
            return Ok(0);
        }

        let index = load_index(self.store.as_ref(), &self.config.index_document).await?;
        let mut referenced: HashSet<String> = HashSet::new();
        for (conversation_id, kind) in index.conversations() {
            let messages = self.store.get_messages(conversation_id, kind).await?;
            referenced.extend(messages.iter().filter_map(|m| m.blob_id()).map(str::to_string));
        }

        let orphaned: Vec<String> = all_ids
            .into_iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter(|id| !referenced.contains(id))
            .collect();

        if orphaned.is_empty() {
            return Ok(0);
        }

        let removed = self.store.bulk_delete_blobs(&orphaned).await?;
        tracing::debug!(orphaned = orphaned.len(), removed, referenced = referenced.len(), "bulk delete finished");
        Ok(orphaned.len())
    }

    /// Keep only the newest `max_messages_per_chat` messages of every conversation.
    ///
    /// Returns the total number of messages dropped.
    pub async fn compress_old_messages(&self, max_messages_per_chat: usize) -> usize {
        let _guard = self.cleanup_lock.lock().await;
        self.run_compression(max_messages_per_chat).await
    }

    async fn run_compression(&self, max_messages_per_chat: usize) -> usize {
        tracing::info!(max_messages_per_chat, "compressing old messages");
        if max_messages_per_chat == 0 {
            tracing::warn!("refusing to compress with a cap of 0");
            return 0;
        }

        match self.truncate_conversations(max_messages_per_chat).await {
            Ok(0) => {
                tracing::info!("no messages to compress");
                0
            }
            Ok(dropped) => {
                tracing::info!(dropped, "compressed old messages");
                dropped
            }
            Err(e) => {
                tracing::error!(error = %e, "message compression failed");
                0
            }
        }
    }

    async fn truncate_conversations(&self, cap: usize) -> Result<usize, Error> {
        let index = load_index(self.store.as_ref(), &self.config.index_document).await?;
        let mut dropped = 0usize;

        for (conversation_id, kind) in index.conversations() {
            let messages = self.store.get_messages(conversation_id, kind).await?;
            if messages.len() <= cap {
                continue;
            }

            let excess = messages.len() - cap;
            self.store
                .save_messages(conversation_id, kind, &messages[excess..])
                .await?;
            tracing::debug!(conversation_id, %kind, excess, "truncated conversation");
            dropped += excess;
        }

        Ok(dropped)
    }

    /// Evict orphaned blobs, then compress with the configured cap.
    pub async fn perform_full_cleanup(&self) -> CleanupReport {
        let _guard = self.cleanup_lock.lock().await;
        tracing::info!("starting full cleanup");

        let before = self.calculate_storage_size().await;
        let deleted_images = self.run_eviction().await;
        let deleted_messages = self.run_compression(self.config.max_messages_per_chat).await;
        let after = self.calculate_storage_size().await;

        let saved_space = before.usage as i64 - after.usage as i64;
        tracing::info!(
            saved_mb = %format!("{:.2}", saved_space as f64 / 1024.0 / 1024.0),
            deleted_images,
            deleted_messages,
            "cleanup finished"
        );

        CleanupReport { deleted_images, deleted_messages, saved_space }
    }

    /// Check usage and run a full cleanup only if storage is unhealthy.
    pub async fn maintain(&self) -> Option<CleanupReport> {
        if self.check_storage().await {
            return None;
        }
        Some(self.perform_full_cleanup().await)
    }
}
