//! Tracing initialisation. Everything is written to stderr: stdout belongs
//! to the wrapped package manager.

use tracing_subscriber::{prelude::*, EnvFilter};

use crate::env;

pub fn init_tracing() {
    let level = env::non_empty(env::LOG).unwrap_or_else(|| "warn".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = if env::flag(env::LOG_JSON) {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
}
