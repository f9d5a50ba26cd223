//! Logging and per-link counters.

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{Counter, LinkStats, ProtocolStats};
