use tracing_subscriber::{EnvFilter, fmt};

/// Install the global tracing subscriber.
///
/// RUST_LOG wins when set; otherwise `--debug` selects `debug` and the
/// default is `info`. Output goes to stderr because stdout carries the
/// JSON-RPC stream.
pub fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
