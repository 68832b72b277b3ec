//! Tracing setup for binaries and long-running station terminals.
//!
//! The library itself only emits `tracing` events; embedding applications
//! decide what to do with them. [`init_tracing`] wires up the conventional
//! stack (env-filter, fmt layer, span-aware error layer) for hosts that
//! don't bring their own subscriber.

use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a global tracing subscriber.
///
/// Honors `RUST_LOG` when set; otherwise logs qcledger at `info` and
/// everything else at `warn`. Calling this twice panics (the second
/// registry refuses to install), so hosts should call it exactly once at
/// startup.
///
/// # Examples
///
/// ```rust,no_run
/// qcledger::telemetry::init_tracing();
/// tracing::info!("store starting");
/// ```
pub fn init_tracing() {
    let fmt_layer = fmt::layer().with_target(false);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn,qcledger=info"))
        .expect("static filter directive parses");

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}
