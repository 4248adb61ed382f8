//! Tracing for tests.
//!
//! [`init_test_tracing`] installs a subscriber that writes through the test
//! harness, so log lines show up next to the failing test. Only the first call
//! in a process installs anything.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset: our crates at debug, others quiet.
const DEFAULT_FILTER: &str = "warn,wgctl_core=debug,wgctl_config=debug";

/// Install the test subscriber. Later calls are no-ops.
///
/// ```ignore
/// #[tokio::test]
/// async fn resolves() {
///     wgctl_test_utils::tracing_setup::init_test_tracing();
///     // monitor logs now appear with --nocapture
/// }
/// ```
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
