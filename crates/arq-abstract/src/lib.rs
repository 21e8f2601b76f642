pub mod config;
pub mod error;
pub mod interface;
pub mod packet;
pub mod scenario;

pub use config::{ProtocolConfig, SimConfig};
pub use error::ProtocolError;
pub use interface::{ProtocolEntity, SystemContext};
pub use packet::{Message, PAYLOAD_LEN, Packet, UNUSED};
pub use scenario::{ConfigOverride, TestAction, TestAssertion, TestScenario};
