//! Storage usage estimates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{CacheDb, Error};

/// Bytes in use and bytes available, as reported by the platform.
///
/// A quota of 0 means the platform does not know its limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEstimate {
    pub usage: u64,
    pub quota: u64,
}

/// Source of storage usage figures.
#[async_trait]
pub trait StorageEstimator: Send + Sync {
    async fn estimate(&self) -> Result<StorageEstimate, Error>;
}

/// Estimates usage from SQLite page accounting against a fixed ceiling.
#[derive(Clone, Debug)]
pub struct DbEstimator {
    db: CacheDb,
    quota: u64,
}

impl DbEstimator {
    pub fn new(db: CacheDb, quota: u64) -> Self {
        Self { db, quota }
    }
}

#[async_trait]
impl StorageEstimator for DbEstimator {
    async fn estimate(&self) -> Result<StorageEstimate, Error> {
        let usage = self
            .db
            .allocated_bytes()
            .await
            .map_err(|e| Error::EstimateUnavailable(e.to_string()))?;
        Ok(StorageEstimate { usage, quota: self.quota })
    }
}
