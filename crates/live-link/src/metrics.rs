use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::warn;

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static POLLS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("live_link_polls_total", "long polls completed by outcome"),
        &["outcome"],
    )
    .expect("static metric opts");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static DISPATCHED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "live_link_dispatched_total",
            "update entries dispatched by kind",
        ),
        &["kind"],
    )
    .expect("static metric opts");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static HANDSHAKE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(Opts::new(
        "live_link_handshake_failures_total",
        "failed handshakes",
    ))
    .expect("static metric opts");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static RECONNECTS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(Opts::new(
        "live_link_reconnects_total",
        "handshakes that resubscribed an earlier session",
    ))
    .expect("static metric opts");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static PENDING_REQUESTS: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::with_opts(Opts::new(
        "live_link_pending_requests",
        "requests awaiting their correlation id",
    ))
    .expect("static metric opts");
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub fn gather() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        warn!(target = "live.metrics", error = %err, "metrics encode error");
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathered_text_names_touched_metrics() {
        POLLS.with_label_values(&["empty"]).inc();
        DISPATCHED.with_label_values(&["url"]).inc();
        let text = String::from_utf8(gather()).unwrap();
        assert!(text.contains("live_link_polls_total"));
        assert!(text.contains("live_link_dispatched_total"));
    }
}
