//! Tracing setup for the engine and its binaries

use tracing_subscriber::EnvFilter;

/// Default filter: engine at info, journal replay chatter at warn.
const DEFAULT_DIRECTIVES: &str = "info,muninn_core::journal=warn";

/// Install the global tracing subscriber.
///
/// Filter precedence: `RUST_LOG` when set, then `log_level`, then the
/// engine default (pass an empty string to get it). `json_logs` switches
/// to line-delimited JSON for log shippers. Installing twice (tests,
/// embedded use) is a no-op rather than a panic.
pub fn init_logger(log_level: &str, json_logs: bool) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| {
            if log_level.is_empty() {
                DEFAULT_DIRECTIVES.to_string()
            } else {
                log_level.to_string()
            }
        });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives))
        .with_target(true)
        .with_thread_ids(true);

    let installed = if json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed, keeping it");
    }
}
