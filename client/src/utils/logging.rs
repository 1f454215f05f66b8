use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "paddy_client=debug,warn";

/// Initialize logging with tracing
///
/// - Reads the filter from `RUST_LOG` if set
/// - Falls back to `paddy_client=debug,warn`
///
/// Safe to call more than once; only the first call installs the subscriber.
///
/// # Example
///
/// ```no_run
/// use paddy_client::utils::logging::init_logging;
///
/// init_logging();
/// ```
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .is_ok()
    {
        tracing::info!("Paddy client logging initialized");
    }
}

/// Install a test-writer subscriber, ignoring an existing one
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(EnvFilter::new(DEFAULT_FILTER))
        .try_init();
}
