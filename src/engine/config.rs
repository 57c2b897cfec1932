//! Engine configuration options.

use crate::types::Rate;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// Slippage bound for requests that don't carry their own.
    pub default_max_slippage: Rate,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            default_max_slippage: Rate::from_fraction(1, 100), // 1%
        }
    }
}
