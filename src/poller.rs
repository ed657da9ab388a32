// src/poller.rs
//
// The orchestrator: FETCH -> MERGE -> DIFF+BROADCAST -> STORE-AS-PREVIOUS on a
// fixed cadence, forever. Nothing inside a cycle may terminate the loop; a
// failed cycle is reported to subscribers as an `error` event and the next
// tick retries from scratch.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde_json::json;

use crate::diff::diff;
use crate::feed::{SourceHealth, SourceId, SourcePair};
use crate::merge::{merge, UnifiedSnapshot};
use crate::stream::{EventKind, Registry};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("relay_poll_cycles_total", "Completed poll cycles.");
        describe_counter!(
            "relay_fetch_errors_total",
            "Upstream fetches degraded to absent."
        );
        describe_counter!(
            "relay_broadcasts_total",
            "Change-sets fanned out to subscribers."
        );
        describe_counter!(
            "relay_subscribers_evicted_total",
            "Subscribers dropped over a saturated queue."
        );
        describe_gauge!(
            "relay_stream_subscribers",
            "Currently connected stream subscribers."
        );
        describe_gauge!(
            "relay_poll_last_run_ts",
            "Unix ts when the polling loop last completed a cycle."
        );
    });
}

pub struct Poller {
    sources: SourcePair,
    registry: Arc<Registry>,
    health: Arc<SourceHealth>,
    interval: Duration,
}

impl Poller {
    pub fn new(
        sources: SourcePair,
        registry: Arc<Registry>,
        health: Arc<SourceHealth>,
        interval: Duration,
    ) -> Self {
        Self {
            sources,
            registry,
            health,
            interval,
        }
    }

    /// Run forever. The previous unified snapshot lives on this task's stack:
    /// written here, read by the diff within the same cycle, touched by
    /// nothing else.
    pub async fn run(self) {
        ensure_metrics_described();
        let mut ticker = tokio::time::interval(self.interval);
        let mut previous: Option<UnifiedSnapshot> = None;

        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_once(&mut previous).await {
                tracing::warn!(error = ?e, "poll cycle failed");
                self.registry.publish(
                    EventKind::Error,
                    json!({ "error": "Failed to fetch stock data" }),
                );
            }
        }
    }

    /// One cycle of the steady state. Public so tests can drive the pipeline
    /// without the timer.
    pub async fn poll_once(&self, previous: &mut Option<UnifiedSnapshot>) -> Result<()> {
        let (raw1, raw2) = self.sources.fetch_both().await;

        counter!("relay_poll_cycles_total").increment(1);
        gauge!("relay_poll_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);

        // A transient double outage idles the cycle and leaves the stored
        // previous snapshot alone, so recovery does not manufacture a false
        // "everything changed" diff.
        if raw1.is_none() && raw2.is_none() {
            tracing::debug!("both sources absent, idling this cycle");
            return Ok(());
        }

        if raw1.is_some() {
            self.health.mark(SourceId::Api1);
        }
        if raw2.is_some() {
            self.health.mark(SourceId::Api2);
        }

        let current = merge(raw1, raw2);
        if let Some(changes) = diff(&current, previous.as_ref()) {
            tracing::info!(changed = changes.len(), "broadcasting rate changes");
            counter!("relay_broadcasts_total").increment(1);
            self.registry
                .publish(EventKind::RateUpdate, serde_json::to_value(&changes)?);
        }

        *previous = Some(current);
        Ok(())
    }
}
