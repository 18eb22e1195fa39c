/*!
   Functions for initializing each test at the beginning of a Rust test
   session.
*/

use std::env;
use std::sync::Once;
use tracing_subscriber::{
    self as ts,
    filter::{EnvFilter, LevelFilter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::types::config::TestConfig;

static INIT: Once = Once::new();

/**
   Initialize the test with a global logger and error handlers,
   read the environment variables and return a [`TestConfig`].

   Safe to call from every test; the global handlers are only
   installed once per process.
*/
pub fn init_test() -> TestConfig {
    let no_color_log = env::var("NO_COLOR_LOG")
        .ok()
        .map(|val| val == "1")
        .unwrap_or(false);

    INIT.call_once(|| {
        if !no_color_log {
            // Another handler may have been installed by the test binary.
            let _ = color_eyre::install();
        }
        install_logger(!no_color_log);
    });

    TestConfig::from_env()
}

/**
   Install the [`tracing_subscriber`] logger handlers so that logs will
   be displayed during test.
*/
pub fn install_logger(with_color: bool) {
    // Use log level INFO by default if RUST_LOG is not set.
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let layer = ts::fmt::layer().with_ansi(with_color).with_test_writer();

    // Ignore the error if a global subscriber is already set.
    let _ = ts::registry().with(env_filter).with(layer).try_init();
}
