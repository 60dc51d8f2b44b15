use serde::{Deserialize, Serialize};

use crate::state::DEFAULT_EPSILON;

pub const DEFAULT_TICK_RATE: u32 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Distance under which an interpolated value snaps to its target.
    pub interpolation_epsilon: f32,
    /// Logic ticks per second a host loop should run the engine at.
    pub tick_rate: u32,
    /// Buffered RPCs the server keeps for late joiners before dropping the oldest.
    pub buffered_rpc_limit: usize,
    pub inbox_warn_threshold: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            interpolation_epsilon: DEFAULT_EPSILON,
            tick_rate: DEFAULT_TICK_RATE,
            buffered_rpc_limit: 1024,
            inbox_warn_threshold: 4096,
        }
    }
}
