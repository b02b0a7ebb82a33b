//! Core types and shared functionality for chatcache.
//!
//! This crate provides:
//! - Versioned response buckets with SQLite backend
//! - The chat store contract and its SQLite adapter
//! - Storage reclamation (orphaned blobs, message compression)
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod reclaimer;
pub mod store;

pub use cache::{Bucket, CacheDb, CachedResponse};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use reclaimer::{CleanupReport, ReclaimerConfig, StorageReclaimer, StorageUsage};
pub use store::{ChatMessage, ChatStore, ConversationIndex, ConversationKind, DbEstimator, StorageEstimate, StorageEstimator};
