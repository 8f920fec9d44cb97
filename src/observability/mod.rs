//! Tracing and metrics bootstrap.
//!
//! `tracing-subscriber` with an `EnvFilter` defaulting to `info`, the same
//! setup shape the teacher uses ahead of its (here dropped) OpenTelemetry
//! exporter — Kavach keeps the local subscriber and the Prometheus registry
//! but drops the OTel collector wiring, since nothing in this spec calls for
//! a trace-export pipeline (see DESIGN.md).

pub mod metrics;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
