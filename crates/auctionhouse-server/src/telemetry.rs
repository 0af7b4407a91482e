//! Trace and metrics initialization.
//!
//! Tracing is configured directly against `tracing-subscriber` rather than
//! through a bespoke wrapper: JSON output when stdout is not a tty (or when
//! forced), human-readable otherwise, filtered by the directives in
//! [`crate::Config::log`]. Metrics are exposed by standing up a Prometheus
//! HTTP listener and registering every counter this crate emits.

use std::{
    io::IsTerminal as _,
    net::SocketAddr,
};

use auctionhouse_eyre::eyre::{
    self,
    WrapErr as _,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{
    layer::SubscriberExt as _,
    util::SubscriberInitExt as _,
    EnvFilter,
};

use crate::Config;

/// Installs the global tracing subscriber and, unless disabled, a Prometheus
/// metrics exporter. Must be called exactly once, early in `main`.
///
/// # Errors
/// Returns an error if the filter directives are invalid or the metrics
/// listener address cannot be bound.
pub fn init(config: &Config) -> eyre::Result<()> {
    let filter = EnvFilter::try_new(&config.log).wrap_err("invalid log filter directives")?;
    let use_json = config.force_stdout || !std::io::stdout().is_terminal();

    let registry = tracing_subscriber::registry().with(filter);
    if config.pretty_print {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    } else if use_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if !config.no_metrics {
        let addr: SocketAddr = config
            .metrics_http_listener_addr
            .parse()
            .wrap_err("invalid metrics_http_listener_addr")?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .wrap_err("failed to install prometheus metrics exporter")?;
        crate::metrics::register();
    }

    Ok(())
}
