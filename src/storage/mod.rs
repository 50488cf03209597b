//! Lazy storage: big maps and sapling states addressed by identifier.
//!
//! - [`storage_trait`]: the read-only [`LazyStorage`](storage_trait::LazyStorage) accessor
//! - [`lazy_diff`]: diff extraction, merging and application
//! - [`memory_storage`]: in-memory accessor used to chain runs
//! - [`state_view`]: copy-on-write overlay over another accessor

pub mod lazy_diff;
pub mod memory_storage;
pub mod state_view;
pub mod storage_trait;
