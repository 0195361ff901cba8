//! Prometheus metrics recording and endpoint.
//!
//! With the `metrics` feature disabled every recorder is a no-op.

#[cfg(feature = "metrics")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus metrics recorder and return the handle for rendering.
#[cfg(feature = "metrics")]
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

/// Record an inbound call-start webhook.
pub fn record_call_start() {
    #[cfg(feature = "metrics")]
    ::metrics::counter!("calls_started_total").increment(1);
}

/// Record a speech turn forwarded to the model.
pub fn record_speech_turn() {
    #[cfg(feature = "metrics")]
    ::metrics::counter!("speech_turns_total").increment(1);
}

/// Record a blank transcript answered with the reprompt.
pub fn record_reprompt() {
    #[cfg(feature = "metrics")]
    ::metrics::counter!("reprompts_total").increment(1);
}

/// Record a failed completion replaced with the apology.
pub fn record_provider_error() {
    #[cfg(feature = "metrics")]
    ::metrics::counter!("provider_errors_total").increment(1);
}

/// Record how long a completion request took.
pub fn record_completion(duration_secs: f64) {
    #[cfg(feature = "metrics")]
    ::metrics::histogram!("completion_duration_seconds").record(duration_secs);
    #[cfg(not(feature = "metrics"))]
    let _ = duration_secs;
}

/// Publish the number of live call sessions.
pub fn set_active_calls(count: usize) {
    #[cfg(feature = "metrics")]
    ::metrics::gauge!("calls_active").set(count as f64);
    #[cfg(not(feature = "metrics"))]
    let _ = count;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_do_not_panic_without_exporter() {
        record_call_start();
        record_speech_turn();
        record_reprompt();
        record_provider_error();
        record_completion(0.25);
        set_active_calls(3);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_prometheus_renders_recorded_counters() {
        let handle = test_prometheus_handle();
        record_call_start();
        record_provider_error();
        let output = handle.render();
        assert!(output.contains("calls_started_total"), "got: {output}");
        assert!(output.contains("provider_errors_total"), "got: {output}");
    }
}

/// Process-wide recorder for tests; only one global recorder can be installed.
#[cfg(all(test, feature = "metrics"))]
pub(crate) fn test_prometheus_handle() -> PrometheusHandle {
    static HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();
    HANDLE
        .get_or_init(|| install_prometheus_recorder().expect("install Prometheus recorder"))
        .clone()
}
