use tracing::trace;

// Lightweight metrics helpers emitted as trace events; the Prometheus
// recorder installed in main renders whatever the exporter has collected.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "listing.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "listing.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn photo_uploaded(ok: bool) {
    trace!(target = "listing.metrics", ok = ok, "photo_uploaded");
}

pub fn event_outcome(phase: &'static str, outcome: &'static str) {
    trace!(
        target = "listing.metrics",
        phase = phase,
        outcome = outcome,
        "event_outcome"
    );
}
