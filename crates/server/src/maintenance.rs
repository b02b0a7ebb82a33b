//! Periodic storage maintenance.
//!
//! Checks usage on every tick and runs a full cleanup only when storage is
//! above the warning threshold. The first tick fires right away.

use std::time::Duration;

use chatcache_core::{CleanupReport, StorageReclaimer};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Spawn the maintenance loop. Abort the handle to stop it.
pub fn spawn(reclaimer: StorageReclaimer, every: Duration) -> JoinHandle<()> {
    tracing::info!(interval_secs = every.as_secs(), "storage maintenance scheduled");
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_once(&reclaimer).await;
        }
    })
}

/// One maintenance pass. Returns the cleanup report if a cleanup ran.
pub async fn run_once(reclaimer: &StorageReclaimer) -> Option<CleanupReport> {
    tracing::debug!("storage maintenance tick");
    let report = reclaimer.maintain().await;
    match &report {
        Some(report) => tracing::info!(
            deleted_images = report.deleted_images,
            deleted_messages = report.deleted_messages,
            saved_space = report.saved_space,
            "storage maintenance cleaned up"
        ),
        None => tracing::debug!("storage healthy"),
    }
    report
}
