//! Tracing setup for the `mobilecombackup-repo` binary.
//!
//! `EnvFilter` + JSON `fmt` layer over a `tracing-subscriber` registry;
//! a validator CLI logs to stdout only, with no rotating file sink.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const ENV_VAR: &str = "MOBILECOMBACKUP_LOG";
const DEFAULT_FILTER: &str = "mobilecombackup_repo=info";

/// Install the global tracing subscriber. Safe to call more than once;
/// later calls are no-ops (`try_init` returns `Err` instead of panicking).
pub fn init() {
    let filter = std::env::var(ENV_VAR).unwrap_or_else(|_| DEFAULT_FILTER.to_string());

    let stdout_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(false)
        .with_span_list(false);

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(stdout_layer);

    let _ = subscriber.try_init();
}
