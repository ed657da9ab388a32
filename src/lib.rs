// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod diff;
pub mod feed;
pub mod merge;
pub mod metrics;
pub mod poller;
pub mod stream;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::diff::{diff, ChangeDirection, ChangeSet, RateChange};
pub use crate::feed::{RawSnapshot, Record, SnapshotSource, SourceHealth, SourceId, SourcePair};
pub use crate::merge::{merge, MergedRecord, SourceTag, UnifiedSnapshot};
pub use crate::poller::Poller;
pub use crate::stream::{Envelope, EventKind, Registry, SubscriberGuard};
