//! Logging and metrics setup.

pub mod logging;
pub mod metrics;

pub use logging::{init_tracing, LogFormat};
pub use self::metrics::install_prometheus_recorder;
