//! Prefetch Tick Task
//!
//! Background-scheduled prefetches sit in the queue until this tick finds
//! them.

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::prefetch::Prefetcher;

/// Spawns the periodic queue drain, firing every `tick_interval` of the
/// prefetcher's config.
///
/// A tick that finds the queue empty or a drain already running does
/// nothing.
pub fn spawn_prefetch_ticker<V>(prefetcher: Prefetcher<V>) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    let interval = prefetcher.config().tick_interval;

    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "starting prefetch ticker");

        loop {
            tokio::time::sleep(interval).await;

            if !prefetcher.has_pending() || prefetcher.is_processing() {
                continue;
            }
            debug!("prefetch tick draining queue");
            prefetcher.process_queue().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefetch::{PrefetchConfig, PrefetchOptions, PrefetchState};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_tick_drains_background_work() {
        let prefetcher = Prefetcher::new(PrefetchConfig {
            tick_interval: Duration::from_millis(100),
            ..Default::default()
        });
        prefetcher
            .schedule_prefetch(
                "accounts",
                || async { Ok::<_, anyhow::Error>(vec!["acc-1".to_string()]) },
                PrefetchOptions::default(),
            )
            .await;
        assert_eq!(prefetcher.status("accounts"), Some(PrefetchState::Queued));

        let handle = spawn_prefetch_ticker(prefetcher.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(prefetcher.has_pending());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(prefetcher.status("accounts"), Some(PrefetchState::Cached));
        assert!(!prefetcher.has_pending());
        handle.abort();
    }
}
