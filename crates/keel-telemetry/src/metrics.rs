//! Prometheus recorder installation and rendering.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::TelemetryError;

/// Install the global Prometheus recorder.
///
/// Returns the handle used to render `/metrics`. Call once, before any
/// metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, TelemetryError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from a recorder handle.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_recorded_counter() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("keel_test_events_total").increment(3);
        });

        let output = render(&handle);
        assert!(output.contains("keel_test_events_total 3"), "{output}");
    }

    #[test]
    fn render_empty_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        assert!(!render(&recorder.handle()).contains("keel_test_events_total"));
    }
}
