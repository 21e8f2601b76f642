use thiserror::Error;

use crate::packet::PAYLOAD_LEN;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("payload of {0} bytes exceeds the fixed {PAYLOAD_LEN}-byte message size")]
    PayloadTooLarge(usize),

    #[error("window size must be at least 1")]
    InvalidWindowSize,

    #[error("retransmission timeout must be non-zero")]
    InvalidTimeout,
}
