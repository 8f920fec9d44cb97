//! Prometheus counters for the request and sync paths, registered against a
//! process-global registry the way the teacher's `processing_metrics`
//! module registers its SOPS/kustomize counters — one `LazyLock` per metric,
//! gathered on demand by the `/metrics` handler.

use std::sync::LazyLock;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static HTTP_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let metric = IntCounterVec::new(
        Opts::new("kavach_http_requests_total", "Total HTTP requests handled"),
        &["method", "status"],
    )
    .expect("failed to create kavach_http_requests_total metric");
    REGISTRY
        .register(Box::new(metric.clone()))
        .expect("failed to register kavach_http_requests_total");
    metric
});

pub static AUTHZ_DECISIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let metric = IntCounterVec::new(
        Opts::new(
            "kavach_authz_decisions_total",
            "Authorization decisions by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create kavach_authz_decisions_total metric");
    REGISTRY
        .register(Box::new(metric.clone()))
        .expect("failed to register kavach_authz_decisions_total");
    metric
});

pub static PROVIDER_SYNC_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let metric = IntCounterVec::new(
        Opts::new(
            "kavach_provider_sync_total",
            "Provider sync attempts by variant and outcome",
        ),
        &["variant", "outcome"],
    )
    .expect("failed to create kavach_provider_sync_total metric");
    REGISTRY
        .register(Box::new(metric.clone()))
        .expect("failed to register kavach_provider_sync_total");
    metric
});

pub static PROVIDER_SYNC_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    let metric = Histogram::with_opts(
        HistogramOpts::new(
            "kavach_provider_sync_duration_seconds",
            "Duration of a full provider sync call",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("failed to create kavach_provider_sync_duration_seconds metric");
    REGISTRY
        .register(Box::new(metric.clone()))
        .expect("failed to register kavach_provider_sync_duration_seconds");
    metric
});

pub static SECRET_VERSIONS_CREATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let metric = IntCounter::new(
        "kavach_secret_versions_created_total",
        "Total secret versions created across all environments",
    )
    .expect("failed to create kavach_secret_versions_created_total metric");
    REGISTRY
        .register(Box::new(metric.clone()))
        .expect("failed to register kavach_secret_versions_created_total");
    metric
});

pub fn record_authz_decision(allowed: bool) {
    AUTHZ_DECISIONS_TOTAL
        .with_label_values(&[if allowed { "allow" } else { "deny" }])
        .inc();
}

pub fn record_provider_sync(variant: &str, success: bool, duration_seconds: f64) {
    PROVIDER_SYNC_TOTAL
        .with_label_values(&[variant, if success { "success" } else { "failure" }])
        .inc();
    PROVIDER_SYNC_DURATION.observe(duration_seconds);
}

pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    REGISTRY.gather()
}
