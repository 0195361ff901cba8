//! Gateway shared state.

use std::sync::Arc;
use std::time::Instant;

use callrelay_core::config::Config;

use crate::relay::ConversationRelay;

/// Shared state handed to every request handler.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub relay: ConversationRelay,
    pub started_at: Instant,
    #[cfg(feature = "metrics")]
    pub prometheus: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl GatewayState {
    pub fn new(config: Arc<Config>, relay: ConversationRelay) -> Self {
        Self {
            config,
            relay,
            started_at: Instant::now(),
            #[cfg(feature = "metrics")]
            prometheus: None,
        }
    }

    #[cfg(feature = "metrics")]
    pub fn with_prometheus(mut self, handle: metrics_exporter_prometheus::PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
