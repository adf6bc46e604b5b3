//! Tracing subscriber bootstrap shared by binaries and tests.

use crate::types::{MemtreeError, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber with the provided filter
/// directive (e.g. `"info"` or `"memtree=debug"`).
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level).map_err(|_| MemtreeError::Invalid("invalid log filter"))?,
        )
        .with_target(true)
        .try_init()
        .map_err(|_| MemtreeError::Invalid("logging already initialized"))
}
