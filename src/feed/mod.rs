// src/feed/mod.rs
pub mod http;
pub mod types;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use metrics::counter;

pub use types::{RawSnapshot, Record, SnapshotSource, SourceId};

/// Fetch once and absorb any failure into "absent for this cycle".
pub async fn fetch_or_absent(source: &dyn SnapshotSource) -> Option<RawSnapshot> {
    match source.fetch().await {
        Ok(raw) => Some(raw),
        Err(e) => {
            tracing::warn!(error = ?e, source = %source.id(), "source fetch failed");
            counter!("relay_fetch_errors_total", "source" => source.id().as_str()).increment(1);
            None
        }
    }
}

/// The two upstream sources, fetched symmetrically.
#[derive(Clone)]
pub struct SourcePair {
    pub api1: Arc<dyn SnapshotSource>,
    pub api2: Arc<dyn SnapshotSource>,
}

impl SourcePair {
    /// Both fetches run concurrently; each failure degrades to `None`.
    pub async fn fetch_both(&self) -> (Option<RawSnapshot>, Option<RawSnapshot>) {
        tokio::join!(
            fetch_or_absent(self.api1.as_ref()),
            fetch_or_absent(self.api2.as_ref()),
        )
    }

    pub async fn fetch_one(&self, id: SourceId) -> Option<RawSnapshot> {
        match id {
            SourceId::Api1 => fetch_or_absent(self.api1.as_ref()).await,
            SourceId::Api2 => fetch_or_absent(self.api2.as_ref()).await,
        }
    }

    pub fn endpoint(&self, id: SourceId) -> &str {
        match id {
            SourceId::Api1 => self.api1.endpoint(),
            SourceId::Api2 => self.api2.endpoint(),
        }
    }
}

/// Sticky per-source flags: set the first time a source yields a snapshot,
/// read by the health endpoint.
#[derive(Debug, Default)]
pub struct SourceHealth {
    api1: AtomicBool,
    api2: AtomicBool,
}

impl SourceHealth {
    pub fn mark(&self, id: SourceId) {
        self.slot(id).store(true, Ordering::Relaxed);
    }

    pub fn has_data(&self, id: SourceId) -> bool {
        self.slot(id).load(Ordering::Relaxed)
    }

    fn slot(&self, id: SourceId) -> &AtomicBool {
        match id {
            SourceId::Api1 => &self.api1,
            SourceId::Api2 => &self.api2,
        }
    }
}
