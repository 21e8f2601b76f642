use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Parameters of the protocol entities, read once at initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Maximum number of unacknowledged packets in flight; also the size
    /// of the receiver's out-of-order buffer.
    pub window_size: usize,
    /// Retransmission timeout per packet, in simulated milliseconds.
    pub timeout: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            window_size: 8,
            timeout: 400,
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.window_size == 0 {
            return Err(ProtocolError::InvalidWindowSize);
        }
        if self.timeout == 0 {
            return Err(ProtocolError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Parameters of the simulated channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub min_latency: u64,
    pub max_latency: u64,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            min_latency: 10,
            max_latency: 100,
            seed: 0,
        }
    }
}
