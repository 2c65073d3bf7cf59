use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize diagnostic logging on stderr. User-facing output stays on stdout.
pub fn init_tracing(verbose: bool, log_level: Option<&str>) -> anyhow::Result<()> {
    let level = match (verbose, log_level) {
        (_, Some(level)) => level,
        (true, None) => "debug",
        (false, None) => "warn",
    };

    // COLLEGE_PREFERENCE_LOG overrides the CLI flags
    let filter = EnvFilter::try_from_env("COLLEGE_PREFERENCE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if level.contains('=') {
            level.to_string()
        } else {
            format!("college_preference={}", level)
        })
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    Ok(())
}
