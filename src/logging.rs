//! env_logger setup

/// Initialize the global logger on stderr.
///
/// `filter` uses env_logger syntax (`info`, `beerbot=debug,warn`, ...). Socket and
/// HTTP client internals stay at `warn` unless the filter names them.
pub fn init(filter: &str) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter));

    for noisy in ["tungstenite", "tokio_tungstenite", "hyper", "hyper_util", "reqwest", "rustls"] {
        if !filter.contains(noisy) {
            builder.filter_module(noisy, log::LevelFilter::Warn);
        }
    }

    builder.target(env_logger::Target::Stderr).init();
}
