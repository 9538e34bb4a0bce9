use std::env;
use std::io::IsTerminal;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

use crate::config::{Config, LogFormat};

/// Installs the global tracing subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over the configured level. It is either a plain level, or a full
/// filter directive that is used verbatim.
pub fn init_tracing(config: &Config) {
    let (level, env_filter) = parse_rust_log(config.logging.level);

    let format = match config.logging.format {
        LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        format => format,
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);
    let layer = match format {
        LogFormat::Pretty => layer.compact().without_time().boxed(),
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
        LogFormat::Simplified | LogFormat::Auto => layer.with_ansi(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(level))
        .with(env_filter)
        .init();
}

/// Determines the effective level and the per-crate filter.
///
/// Without `RUST_LOG`, the given level applies to the storebench crates while dependencies only log
/// warnings.
pub fn parse_rust_log(configured: LevelFilter) -> (LevelFilter, EnvFilter) {
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<Level>() {
            Ok(level) => LevelFilter::from_level(level),
            Err(_) => return (LevelFilter::TRACE, EnvFilter::new(value)),
        },
        Err(_) => configured,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "WARN,\
        storebench=TRACE,\
        storebench_harness=TRACE,\
        storebench_backends=TRACE,\
        ",
    );

    (level, env_filter)
}
