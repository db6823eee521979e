use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "gradebookd=warn";

/// Installs the global subscriber. Everything goes to stderr because stdout
/// carries IPC responses.
pub fn init_tracing(log_level: Option<&str>, log_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG wins; otherwise GRADEBOOKD_LOG arrives here as `log_level`.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}

fn filter_directive(log_level: Option<&str>) -> String {
    match log_level {
        None => DEFAULT_FILTER.to_string(),
        Some(level) if level.contains('=') => level.to_string(),
        Some(level) => format!("gradebookd={}", level),
    }
}
