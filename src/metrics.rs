use crate::models::ContentSource;
use ::metrics::{counter, histogram};
use tracing::trace;

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "optimizer.metrics",
        route = route,
        "requests_total_inc"
    );
    counter!("optimizer_requests_total", "route" => route).increment(1);
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "optimizer.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
    histogram!("optimizer_stage_ms", "stage" => stage).record(elapsed_ms as f64);
}

pub fn generation_source(source: ContentSource) {
    counter!("optimizer_generation_total", "source" => source.as_str()).increment(1);
}

pub fn product_outcome(outcome: &'static str) {
    counter!("optimizer_products_total", "outcome" => outcome).increment(1);
}
