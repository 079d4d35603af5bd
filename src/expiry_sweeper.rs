//! Recurring eviction of expired stories.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::story_store::StoryStore;

/// Evicts stories past their retention window on a fixed interval.
///
/// The interval is a staleness bound, not a deadline: a story may stay
/// visible up to one interval past its nominal expiry. Sweeping never blocks
/// other components and never errors; an empty store is a no-op pass.
pub struct ExpirySweeper {
    store: Arc<StoryStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<StoryStore>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            store,
            clock,
            interval,
        }
    }

    /// One eviction pass. Returns the number of stories evicted.
    pub fn sweep_once(&self) -> usize {
        let evicted = self.store.sweep_expired(self.clock.now());
        if evicted > 0 {
            info!(
                evicted = evicted,
                live = self.store.len(),
                "Sweep evicted expired stories"
            );
        } else {
            debug!(live = self.store.len(), "Sweep pass, nothing expired");
        }
        evicted
    }

    /// Run sweep passes until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        // tokio intervals fire immediately; skip the startup tick so passes
        // land on the interval boundaries.
        ticker.tick().await;

        info!(
            interval_secs = self.interval.as_secs(),
            "Expiry sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once();
                }
                _ = shutdown.cancelled() => {
                    info!("Expiry sweeper stopped");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::media_ingest::{MediaAsset, MediaKind};
    use bytes::Bytes;
    use chrono::Utc;

    fn image_asset() -> MediaAsset {
        MediaAsset::new(MediaKind::Image, "image/png", Bytes::from_static(b"png"))
    }

    fn fixture() -> (Arc<StoryStore>, Arc<ManualClock>, ExpirySweeper) {
        let store = Arc::new(StoryStore::new(chrono::Duration::hours(24)));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sweeper = ExpirySweeper::new(store.clone(), clock.clone(), Duration::from_secs(60));
        (store, clock, sweeper)
    }

    #[test]
    fn sweep_once_evicts_past_retention() {
        let (store, clock, sweeper) = fixture();
        store.admit(image_asset(), None, clock.now());

        assert_eq!(sweeper.sweep_once(), 0);
        assert_eq!(store.len(), 1);

        clock.advance(chrono::Duration::hours(24) + chrono::Duration::minutes(1));
        assert_eq!(sweeper.sweep_once(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_once_on_empty_store_is_noop() {
        let (_store, _clock, sweeper) = fixture();
        assert_eq!(sweeper.sweep_once(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_evicts_on_interval_and_stops_on_shutdown() {
        let (store, clock, sweeper) = fixture();
        store.admit(image_asset(), None, clock.now());

        let sweeper = Arc::new(sweeper);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let sweeper = sweeper.clone();
            let shutdown = shutdown.clone();
            async move { sweeper.run(shutdown).await }
        });

        clock.advance(chrono::Duration::hours(24) + chrono::Duration::minutes(1));
        // Paused tokio time auto-advances to the next tick once tasks idle.
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(store.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
