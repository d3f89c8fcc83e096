// Logging initialization
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the tracing subscriber with an env-derived filter.
///
/// Honors `RUST_LOG`; defaults to `info`. Safe to call once per process;
/// callers embedding the bus in a larger application should install their own
/// subscriber instead.
pub fn init_logging() -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
