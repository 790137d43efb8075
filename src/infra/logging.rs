//! Diagnostics go to stderr so stdout stays clean for documents and JSON.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Variable read for a filter directive, e.g. `RELAY_LOG=coderelay=trace`.
pub const LOG_ENV: &str = "RELAY_LOG";

/// Pick the filter: `RELAY_LOG` wins, then `--verbose`, else warnings only.
pub fn filter(verbose: bool) -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) if !directive.trim().is_empty() => {
            EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"))
        }
        _ if verbose => EnvFilter::new("debug"),
        _ => EnvFilter::new("warn"),
    }
}

/// Install the global subscriber. Safe to call once per process.
pub fn init(verbose: bool, no_color: bool) {
    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_timer(ChronoUtc::new("%H:%M:%S%.3f".to_string()))
        .with_ansi(!no_color)
        .with_writer(std::io::stderr);

    // A second init (tests, embedding) is not an error worth surfacing
    let _ = tracing_subscriber::registry()
        .with(filter(verbose))
        .with(layer)
        .try_init();
}
