#![allow(dead_code)]

pub mod fixtures;
pub mod mocks;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Route library logs to the test writer; `RUST_LOG` picks the level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
