use tracing::trace;

// Trace-based counters and timers; the Prometheus exporter only renders
// what a recorder has been given, so these stay as structured events.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "domix.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "domix.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn draft_transition(from: &'static str, to: &'static str) {
    trace!(
        target = "domix.metrics",
        from = from,
        to = to,
        "draft_transitions_total_inc"
    );
}

pub fn drafts_open(count: usize) {
    trace!(
        target = "domix.metrics",
        count = count as u64,
        "drafts_open"
    );
}
