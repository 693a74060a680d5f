//! Shared test harness code, grounded on the teacher's own
//! `tests/common/mod.rs` (`setup_logging`'s once-only tracing-subscriber
//! init), trimmed to the fixture-based subset this crate's tests need.

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

pub fn setup_logging() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter, prelude::*};
        let filter_layer = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("info"))
            .expect("initializing logging");
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt::layer().compact().with_target(false))
            .init();
    });
}
