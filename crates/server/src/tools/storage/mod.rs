//! Storage maintenance tools.
//!
//! This module exposes the reclaimer: a read-only usage report and an
//! on-demand full cleanup.

pub mod cleanup;
pub mod status;

pub use cleanup::{StorageCleanupParams, cleanup_impl};
pub use status::status_impl;
