pub mod builders;
pub mod fake_runner;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests, once per test binary.
///
/// Output goes through `with_test_writer()`, so it only shows up for failing
/// tests (or with `-- --nocapture`). Filter with the same variable as the
/// binary, e.g. `DAGBUILD_LOG=dagbuild::engine=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("DAGBUILD_LOG")
            .unwrap_or_else(|_| EnvFilter::new("dagbuild=info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}
