use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is not provided.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Installs the process-wide JSON subscriber. Each line is one structured
/// entry with the current span fields flattened in, which is the shape the
/// platform log collector indexes.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been installed.
pub fn init_logging() -> Result<(), String> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .with_target(false),
        )
        .try_init()
        .map_err(|error| format!("failed to install tracing subscriber: {error}"))
}
