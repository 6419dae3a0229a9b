//! Global `tracing` subscriber setup.

use boardcast_settings::{LogFormat, LoggingSettings};
use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG` when set, otherwise from the configured directive.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global subscriber writing to stderr.
///
/// Subsequent calls are no-ops.
pub fn init_subscriber(settings: &LoggingSettings) {
    let filter = build_filter(&settings.level);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let _ = match settings.format {
        LogFormat::Pretty => builder.compact().try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_directive_is_used() {
        let filter = build_filter("warn,boardcast_hub=trace");
        let rendered = filter.to_string();
        // RUST_LOG may be set in the test environment.
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(rendered.contains("boardcast_hub=trace"));
        }
    }

    #[test]
    fn init_subscriber_twice_does_not_panic() {
        init_subscriber(&LoggingSettings::default());
        init_subscriber(&LoggingSettings {
            level: "debug".into(),
            format: LogFormat::Json,
        });
    }
}
