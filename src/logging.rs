//! Logger setup
//!
//! All crate modules log through the `log` facade. Binaries and demos call
//! [`init`] once; `RUST_LOG` overrides the default level.

/// Default filter for the given verbosity
pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

/// Install `env_logger`. Later calls are no-ops, which keeps tests and
/// embedding applications that already installed a logger working.
pub fn init(debug: bool) {
    let env = env_logger::Env::default().default_filter_or(default_filter(debug));
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
    log::debug!("Logging initialised (max level {})", log::max_level());
}
