use arq_abstract::{Packet, ProtocolConfig, ProtocolEntity, SystemContext};
use tracing::trace;

/// Selective-Repeat receiver: buffers out-of-order packets in a ring of
/// `window_size` slots and delivers contiguous runs to the application.
///
/// Every packet inside the acceptance range is acknowledged individually,
/// including duplicates of already-delivered sequence numbers: the
/// duplicate means the original ACK was lost, and re-acking repairs that
/// without delivering twice.
pub struct SrReceiver {
    expected_seq: i32,
    window_size: usize,
    slots: Vec<Option<Packet>>,
}

impl SrReceiver {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            expected_seq: 0,
            window_size: config.window_size,
            slots: vec![None; config.window_size],
        }
    }

    /// Smallest sequence number not yet delivered to the application.
    pub fn expected_seq(&self) -> i32 {
        self.expected_seq
    }

    fn slot_index(&self, seq: i32) -> usize {
        seq as usize % self.window_size
    }
}

impl ProtocolEntity for SrReceiver {
    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        if !packet.checksum_ok() {
            ctx.log("corrupted packet, dropped");
            return;
        }

        let seq = packet.seqnum;
        let window = self.window_size as i32;
        // Accept the current window plus the window just behind it: a
        // sequence number below `expected_seq` is a retransmission whose
        // ACK was lost. Anything further out is dropped silently.
        if seq >= self.expected_seq + window || seq < self.expected_seq - window {
            trace!(seq, expected = self.expected_seq, "out of range, dropped");
            return;
        }

        ctx.log(&format!("recv DATA seq={seq}, ACK it"));
        ctx.send_packet(Packet::ack(seq));

        if seq < self.expected_seq {
            // Already delivered; the re-ACK above is all it needed.
            return;
        }

        if seq == self.expected_seq {
            ctx.deliver_data(&packet.payload);
            self.expected_seq += 1;
            // Flush the contiguous run the gap was holding back.
            loop {
                let index = self.slot_index(self.expected_seq);
                match self.slots[index].take() {
                    Some(buffered) => {
                        ctx.log(&format!("deliver buffered seq={}", buffered.seqnum));
                        ctx.deliver_data(&buffered.payload);
                        self.expected_seq += 1;
                    }
                    None => break,
                }
            }
        } else {
            // In-window but ahead of the gap: hold it. Idempotent if the
            // same packet was already buffered.
            let index = self.slot_index(seq);
            self.slots[index] = Some(packet);
        }
    }
}
