use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub(crate) enum Level {
    Default,
    Verbose,
    Quiet,
}

pub(crate) fn setup_logging(level: Level) {
    let default = match level {
        Level::Quiet => LevelFilter::ERROR,
        Level::Default => LevelFilter::INFO,
        Level::Verbose => LevelFilter::DEBUG,
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    // `RUST_LOG` takes over completely when set; otherwise the chosen level
    // applies, with the HTTP internals capped at WARN.
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        tracing_subscriber::registry()
            .with(layer.with_filter(EnvFilter::from_default_env()))
            .init();
    } else {
        let targets = Targets::new()
            .with_target("hyper", LevelFilter::WARN)
            .with_target("reqwest", LevelFilter::WARN)
            .with_default(default);
        tracing_subscriber::registry()
            .with(layer.with_filter(targets))
            .init();
    }
}
