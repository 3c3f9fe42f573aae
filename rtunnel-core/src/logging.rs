use tracing_subscriber::EnvFilter;

/// installs the global fmt subscriber. `RUST_LOG` takes precedence,
/// otherwise `debug` selects between debug and info output.
pub fn init(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // a subscriber may already be installed, e.g. when several tests start one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
