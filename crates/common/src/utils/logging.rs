use std::io;
use configs::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing from the `[logging]` config section.
/// - `RUST_LOG` wins over the configured filter
/// - Writes to stdout to improve visibility in environments that hide stderr
/// - Safe to call more than once; later calls are ignored
pub fn init_logging(cfg: &LoggingConfig) {
    match cfg.format {
        LogFormat::Compact => init_logging_default(&cfg.filter),
        LogFormat::Json => init_logging_json(&cfg.filter),
    }
}

/// Compact human-readable output.
pub fn init_logging_default(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_writer(io::stdout)
        .try_init();
}

/// JSON structured output for log shippers.
pub fn init_logging_json(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .json()
        .with_writer(io::stdout)
        .try_init();
}
