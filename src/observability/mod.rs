//! Observability: structured logging setup

pub mod logging;

pub use logging::{init_from_config, init_logging, LogFormat};
