use metrics::{counter, histogram};
use tracing::trace;

// Recorded through the `metrics` facade; whichever recorder is installed (Prometheus in the
// server) renders them on `/metrics`.

pub const REQUESTS_TOTAL: &str = "snaplist_requests_total";
pub const STAGE_DURATION_MS: &str = "snaplist_stage_duration_ms";
pub const BATCHES_TOTAL: &str = "snaplist_batches_total";
pub const BATCH_IMAGES: &str = "snaplist_batch_images";

pub fn inc_requests(route: &'static str) {
    counter!(REQUESTS_TOTAL, "route" => route).increment(1);
    trace!(target = "snaplist.metrics", route, "requests_total_inc");
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    histogram!(STAGE_DURATION_MS, "stage" => stage).record(elapsed_ms as f64);
    trace!(
        target = "snaplist.metrics",
        stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn batch_finished(outcome: &'static str, image_count: usize) {
    counter!(BATCHES_TOTAL, "outcome" => outcome).increment(1);
    histogram!(BATCH_IMAGES).record(image_count as f64);
    trace!(
        target = "snaplist.metrics",
        outcome,
        images = image_count as u64,
        "batches_total_inc"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn counters_reach_the_prometheus_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            inc_requests("/generate-metadata");
            inc_requests("/generate-metadata");
            stage_elapsed("normalize_images", 12);
            batch_finished("done", 3);
        });

        let rendered = handle.render();
        assert!(
            rendered.contains(r#"snaplist_requests_total{route="/generate-metadata"} 2"#),
            "{rendered}"
        );
        assert!(rendered.contains(r#"snaplist_batches_total{outcome="done"} 1"#), "{rendered}");
        assert!(rendered.contains("snaplist_stage_duration_ms"), "{rendered}");
    }
}
