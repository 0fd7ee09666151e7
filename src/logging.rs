//! Tracing subscriber setup for hosts and local debugging.

use tracing_subscriber::{
    Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Install a pretty-printing subscriber filtered by `RUST_LOG`, defaulting
/// to `info`.
///
/// Call once at process start; library code only emits events and never
/// installs a subscriber itself.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().pretty().with_filter(filter))
        .init();
}
