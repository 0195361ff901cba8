//! Background eviction of abandoned call sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use callrelay_core::session::SessionStore;

use crate::metrics;

/// How often to sweep for a given idle timeout: half the timeout, clamped to 1..=60 s.
pub fn sweep_interval(idle_timeout: Duration) -> Duration {
    (idle_timeout / 2).clamp(Duration::from_secs(1), Duration::from_secs(60))
}

/// Run forever, dropping sessions idle for longer than `idle_timeout`.
///
/// Calls whose status callback never reaches `/call-complete` are cleaned up
/// here. A zero timeout disables the sweeper.
pub async fn run_idle_sweeper(sessions: Arc<dyn SessionStore>, idle_timeout: Duration) {
    if idle_timeout.is_zero() {
        warn!("Idle session sweeper disabled (idle_timeout_secs = 0)");
        return;
    }

    let interval = sweep_interval(idle_timeout);
    info!(
        idle_timeout_secs = idle_timeout.as_secs(),
        interval_secs = interval.as_secs(),
        "Starting idle session sweeper"
    );

    loop {
        sleep(interval).await;
        let evicted = sessions.evict_idle(idle_timeout).await;
        let remaining = sessions.len().await;
        if evicted > 0 {
            info!(evicted, remaining, "Evicted idle call sessions");
        } else {
            debug!(remaining, "Idle sweep found nothing to evict");
        }
        metrics::set_active_calls(remaining);
    }
}
