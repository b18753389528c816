use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the diagnostic log subscriber.
///
/// Diagnostics go to stderr so they never interleave with the status lines
/// on stdout. Default level is "warn"; override with RUST_LOG, e.g.
/// `RUST_LOG=ftpb=debug`.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .init();
}
