use tracing_subscriber::EnvFilter;

/// Crates whose logs are captured at full verbosity.
const CRATE_NAMES: &[&str] = &["storebench", "storebench_harness", "storebench_backends"];

/// Installs a subscriber for tests.
///
/// Logs of the storebench crates are captured at `TRACE`, everything else (HTTP clients, the
/// MongoDB driver) only at `WARN`. Output goes through the test writer, so it only shows up for
/// failing tests. Calling this more than once is fine; later calls are no-ops.
///
/// ```
/// storebench_test::tracing::init();
/// ```
pub fn init() {
    let env_filter = CRATE_NAMES
        .iter()
        .fold(EnvFilter::new("WARN"), |filter, name| {
            filter.add_directive(format!("{name}=TRACE").parse().unwrap())
        });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .without_time()
        .compact()
        .try_init()
        .ok();
}
