pub mod sakila;
pub use pgforge_test_macros::for_all_runtimes;

use pgforge::runtime::strategy::{Strategy, StrategyLike};
use pgforge::runtime::Runtime;

/// Environment variable naming a pre-built instance directory (its
/// `bin/` subdirectory) to include alongside whatever `Strategy::default()`
/// finds on `PATH`. Set by `pgforge-core`'s integration tests after calling
/// `instance::Instance::build` on a scratch directory, so the `for_all_runtimes`
/// harness also exercises freshly-downloaded engines, not only ones already
/// installed on the test machine.
pub const INSTANCE_ENV_VAR: &str = "PGFORGE_TEST_INSTANCE";

/// Every runtime `#[for_all_runtimes]`-annotated tests should run against:
/// PATH/platform-discovered runtimes, plus the one named by
/// [`INSTANCE_ENV_VAR`] if set and valid.
pub fn discover_runtimes() -> Vec<Runtime> {
    let mut runtimes: Vec<Runtime> = Strategy::default().runtimes().collect();
    if let Ok(instance_dir) = std::env::var(INSTANCE_ENV_VAR) {
        match Runtime::new(std::path::Path::new(&instance_dir).join("bin")) {
            Ok(runtime) => runtimes.push(runtime),
            Err(err) => log::warn!("{INSTANCE_ENV_VAR}={instance_dir:?} is not a usable runtime: {err}"),
        }
    }
    runtimes
}

#[ctor::ctor]
/// Initialise a logger for tests. Without this, logs are not emitted – and we
/// are left with less informative captured test output when tests fail.
unsafe fn init_logger() {
    use std::io::{stdout, IsTerminal};
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .with_colors(stdout().is_terminal())
        .env()
        .init()
        .expect("could not initialize logger");
}
