use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Fixed size of every application message payload, in bytes.
/// Shorter submissions are zero-padded up to this length.
pub const PAYLOAD_LEN: usize = 20;

/// Sentinel for the unused half of a packet header: data packets carry
/// no acknowledgement, pure ACKs carry no sequence number.
pub const UNUSED: i32 = -1;

/// An application-layer unit handed to the sender. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    data: [u8; PAYLOAD_LEN],
}

impl Message {
    /// Build a message from raw bytes, zero-padding up to [`PAYLOAD_LEN`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge(bytes.len()));
        }
        let mut data = [0u8; PAYLOAD_LEN];
        data[..bytes.len()].copy_from_slice(bytes);
        Ok(Self { data })
    }

    pub fn as_bytes(&self) -> &[u8; PAYLOAD_LEN] {
        &self.data
    }
}

/// The wire unit exchanged through the unreliable channel.
///
/// `checksum` is the additive sum of `seqnum`, `acknum` and every payload
/// byte. It is not an error-correcting or cryptographic code: corruption
/// that preserves the arithmetic sum passes verification undetected. That
/// weakness is inherited from the protocol's teaching origin and is
/// deliberate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub seqnum: i32,
    pub acknum: i32,
    pub payload: [u8; PAYLOAD_LEN],
    pub checksum: i32,
}

impl Packet {
    /// Build a DATA packet for the given sequence number.
    pub fn data(seqnum: i32, message: &Message) -> Self {
        let mut packet = Self {
            seqnum,
            acknum: UNUSED,
            payload: *message.as_bytes(),
            checksum: 0,
        };
        packet.checksum = packet.compute_checksum();
        packet
    }

    /// Build a pure acknowledgement for the given sequence number.
    pub fn ack(acknum: i32) -> Self {
        let mut packet = Self {
            seqnum: UNUSED,
            acknum,
            payload: [0u8; PAYLOAD_LEN],
            checksum: 0,
        };
        packet.checksum = packet.compute_checksum();
        packet
    }

    pub fn is_ack(&self) -> bool {
        self.acknum != UNUSED
    }

    /// Additive checksum over the header fields and the payload.
    pub fn compute_checksum(&self) -> i32 {
        let mut sum = self.seqnum.wrapping_add(self.acknum);
        for &byte in &self.payload {
            sum = sum.wrapping_add(byte as i32);
        }
        sum
    }

    /// Recompute the checksum and compare it against the received field.
    pub fn checksum_ok(&self) -> bool {
        self.compute_checksum() == self.checksum
    }
}
