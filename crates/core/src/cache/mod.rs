//! SQLite-backed storage for versioned response buckets.
//!
//! This module provides a persistent response cache using SQLite with async
//! access via tokio-rusqlite. It supports:
//!
//! - Named buckets, one per deployment version
//! - Request keys derived from method and canonical URL
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod buckets;
pub mod connection;
pub mod hash;
pub mod migrations;

pub use crate::Error;

pub use buckets::{Bucket, CachedResponse};
pub use connection::CacheDb;
