use crate::config::{ProtocolConfig, SimConfig};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub description: String,
    pub config: ConfigOverride,
    pub actions: Vec<TestAction>,
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ConfigOverride {
    pub loss_rate: Option<f64>,
    pub corrupt_rate: Option<f64>,
    pub min_latency: Option<u64>,
    pub max_latency: Option<u64>,
    pub seed: Option<u64>,
    pub window_size: Option<usize>,
    pub timeout: Option<u64>,
}

impl ConfigOverride {
    pub fn apply_to(&self, sim: &mut SimConfig, protocol: &mut ProtocolConfig) {
        if let Some(v) = self.loss_rate {
            sim.loss_rate = v;
        }
        if let Some(v) = self.corrupt_rate {
            sim.corrupt_rate = v;
        }
        if let Some(v) = self.min_latency {
            sim.min_latency = v;
        }
        if let Some(v) = self.max_latency {
            sim.max_latency = v;
        }
        if let Some(v) = self.seed {
            sim.seed = v;
        }
        if let Some(v) = self.window_size {
            protocol.window_size = v;
        }
        if let Some(v) = self.timeout {
            protocol.timeout = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Application submits a message at a specific simulated time
    AppSend { time: u64, data: String },
    /// Deterministically drop the first DATA packet with given seq number
    DropNextDataSeq { seq: i32 },
    /// Deterministically drop the first ACK with given ack number
    DropNextAckNum { ack: i32 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// Assert that a payload was delivered to the application layer
    DataDelivered { data: String },
    /// Assert the exact number of application deliveries
    DeliveredCount { count: usize },
    /// Assert that the total number of packets sent by the sender entity
    /// is within range
    SenderPacketCount { min: u32, max: Option<u32> },
    /// Assert that the simulation finishes within time
    MaxDuration { ms: u64 },
}
