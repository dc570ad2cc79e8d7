//! Tracing subscriber setup.

use std::sync::Once;

use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt};

static INIT: Once = Once::new();

/// Logging options.
#[derive(Clone, Debug)]
pub struct Config {
    /// A level like "info" or a full filter string such as
    /// "warn,ml_inspect=debug". `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of text.
    pub json: bool,
}

/// Installs the global subscriber. Logs go to stderr so reports written
/// to stdout stay clean. Later calls are no-ops.
pub fn init(cfg: &Config) {
    INIT.call_once(|| {
        let _ = LogTracer::init();

        let filter = EnvFilter::try_from_env("RUST_LOG")
            .or_else(|_| EnvFilter::try_new(&cfg.level))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

        let fmt_layer = if cfg.json {
            fmt::layer()
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(true)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .boxed()
        };

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("failed to set global tracing subscriber: {err}");
        }
    });
}
