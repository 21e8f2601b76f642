use arq_abstract::{ProtocolConfig, SimConfig};
use serde::Serialize;

use crate::engine::LinkEventSummary;

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub protocol: ProtocolConfig,
    pub duration_ms: u64,
    pub delivered_data: Vec<Vec<u8>>,
    pub sender_packet_count: u32,
    pub receiver_packet_count: u32,
    pub link_events: Vec<LinkEventSummary>,
}
