#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod context;
pub mod error;
pub mod health;
pub mod http;
pub mod storage;
pub mod telemetry;

#[cfg(debug_assertions)]
pub fn init_tracing_tests() {
    use std::sync::LazyLock;

    static INIT: LazyLock<std::sync::Mutex<bool>> = LazyLock::new(|| std::sync::Mutex::new(false));

    let mut init = INIT.lock().unwrap();

    if !*init {
        *init = true;
        tracing_subscriber::fmt::init();
        tracing::debug!("Tracing initialized for tests");
    }
}
