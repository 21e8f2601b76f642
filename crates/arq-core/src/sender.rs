use std::collections::VecDeque;

use arq_abstract::{Message, Packet, ProtocolConfig, ProtocolEntity, SystemContext};
use tracing::trace;

/// One in-flight packet: the stored copy for retransmission, its
/// acknowledgement flag, and its absolute retransmission deadline.
/// The deadline is meaningful only while `acked` is false.
#[derive(Debug, Clone)]
struct SendSlot {
    packet: Packet,
    acked: bool,
    deadline: u64,
}

/// Selective-Repeat sender: sliding send window with per-packet
/// retransmission deadlines, plus the FIFO queue of application messages
/// waiting for a free window slot.
///
/// In-flight state lives in a ring of exactly `window_size` slots indexed
/// by `seq % window_size`, so memory stays O(window) however long the
/// run. The substrate offers a single timer, which is re-armed after
/// every state change to the earliest outstanding deadline.
pub struct SrSender {
    base: i32,
    next_seq: i32,
    window_size: usize,
    timeout: u64,
    slots: Vec<Option<SendSlot>>,
    pending: VecDeque<Message>,
}

impl SrSender {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            base: 0,
            next_seq: 0,
            window_size: config.window_size,
            timeout: config.timeout,
            slots: vec![None; config.window_size],
            pending: VecDeque::new(),
        }
    }

    /// Smallest unacknowledged sequence number (the window lower bound).
    pub fn base(&self) -> i32 {
        self.base
    }

    /// Next sequence number to be assigned.
    pub fn next_seq(&self) -> i32 {
        self.next_seq
    }

    /// Number of messages queued behind a full window.
    pub fn queued(&self) -> usize {
        self.pending.len()
    }

    fn in_flight(&self) -> usize {
        (self.next_seq - self.base) as usize
    }

    fn slot_index(&self, seq: i32) -> usize {
        seq as usize % self.window_size
    }

    /// Build, transmit and record the packet for the next sequence number.
    /// Caller must have checked that the window has room.
    fn transmit(&mut self, ctx: &mut dyn SystemContext, message: Message) {
        let seq = self.next_seq;
        let packet = Packet::data(seq, &message);
        ctx.log(&format!("send DATA seq={seq}"));
        ctx.send_packet(packet.clone());

        let index = self.slot_index(seq);
        self.slots[index] = Some(SendSlot {
            packet,
            acked: false,
            deadline: ctx.now() + self.timeout,
        });
        self.next_seq += 1;
    }

    /// Earliest deadline among unacknowledged in-flight packets.
    fn earliest_deadline(&self) -> Option<u64> {
        (self.base..self.next_seq)
            .filter_map(|seq| self.slots[self.slot_index(seq)].as_ref())
            .filter(|slot| !slot.acked)
            .map(|slot| slot.deadline)
            .min()
    }

    /// Point the single substrate timer at the earliest outstanding
    /// deadline, or cancel it if nothing is in flight. Replaces any
    /// pending timer.
    fn rearm_timer(&mut self, ctx: &mut dyn SystemContext) {
        match self.earliest_deadline() {
            Some(deadline) => ctx.start_timer(deadline.saturating_sub(ctx.now())),
            None => ctx.cancel_timer(),
        }
    }

    /// Admit queued messages into window slots freed by a slide.
    fn drain_pending(&mut self, ctx: &mut dyn SystemContext) {
        while self.in_flight() < self.window_size {
            match self.pending.pop_front() {
                Some(message) => self.transmit(ctx, message),
                None => break,
            }
        }
    }
}

impl ProtocolEntity for SrSender {
    fn on_app_message(&mut self, ctx: &mut dyn SystemContext, message: Message) {
        if self.in_flight() < self.window_size {
            self.transmit(ctx, message);
            self.rearm_timer(ctx);
        } else {
            ctx.log(&format!(
                "window full (base={} next={}), queueing message",
                self.base, self.next_seq
            ));
            self.pending.push_back(message);
        }
    }

    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        if !packet.checksum_ok() {
            ctx.log("corrupted ACK, dropped");
            return;
        }
        let ack = packet.acknum;
        if ack < self.base || ack >= self.next_seq {
            trace!(ack, base = self.base, "ACK outside send window, ignored");
            return;
        }

        ctx.log(&format!("ACK seq={ack}"));
        let index = self.slot_index(ack);
        if let Some(slot) = self.slots[index].as_mut() {
            slot.acked = true;
        }

        // Per-packet ACKs are not cumulative: the window only advances
        // when the base itself is acknowledged, and then slides past the
        // whole contiguous acknowledged run in one step.
        if ack == self.base {
            while self.base < self.next_seq {
                let index = self.slot_index(self.base);
                match &self.slots[index] {
                    Some(slot) if slot.acked => {
                        self.slots[index] = None;
                        self.base += 1;
                    }
                    _ => break,
                }
            }
            trace!(base = self.base, "window slid");
        }

        self.drain_pending(ctx);
        self.rearm_timer(ctx);
    }

    fn on_timer(&mut self, ctx: &mut dyn SystemContext) {
        // Retransmit only the packet whose deadline elapsed first, never
        // the whole window. The timer may race an ACK that just cleared
        // the window, in which case there is nothing to do.
        let now = ctx.now();
        let expired = (self.base..self.next_seq)
            .filter(|&seq| {
                self.slots[self.slot_index(seq)]
                    .as_ref()
                    .is_some_and(|slot| !slot.acked && slot.deadline <= now)
            })
            .min_by_key(|&seq| {
                self.slots[self.slot_index(seq)]
                    .as_ref()
                    .map(|slot| slot.deadline)
                    .unwrap_or(u64::MAX)
            });

        if let Some(seq) = expired {
            let index = self.slot_index(seq);
            if let Some(slot) = self.slots[index].as_mut() {
                ctx.log(&format!("timeout, retransmit DATA seq={seq}"));
                let packet = slot.packet.clone();
                slot.deadline = now + self.timeout;
                ctx.send_packet(packet);
            }
        }

        self.rearm_timer(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingContext, TimerOp};

    fn config() -> ProtocolConfig {
        ProtocolConfig {
            window_size: 4,
            timeout: 400,
        }
    }

    fn msg(i: usize) -> Message {
        Message::from_bytes(format!("m{i}").as_bytes()).unwrap()
    }

    fn ack(seq: i32) -> Packet {
        Packet::ack(seq)
    }

    #[test]
    fn fills_window_then_queues() {
        let mut sender = SrSender::new(&config());
        let mut ctx = RecordingContext::new();

        for i in 0..6 {
            sender.on_app_message(&mut ctx, msg(i));
        }

        assert_eq!(ctx.sent_data_seqs(), vec![0, 1, 2, 3]);
        assert_eq!(sender.base(), 0);
        assert_eq!(sender.next_seq(), 4);
        assert_eq!(sender.queued(), 2);
    }

    #[test]
    fn out_of_order_acks_slide_in_one_step() {
        let mut sender = SrSender::new(&config());
        let mut ctx = RecordingContext::new();
        for i in 0..6 {
            sender.on_app_message(&mut ctx, msg(i));
        }

        // ACK for 2 arrives first: recorded, but base stays at 0 and the
        // window stays full, so m4/m5 remain queued.
        sender.on_packet(&mut ctx, ack(2));
        assert_eq!(sender.base(), 0);
        assert_eq!(ctx.sent_data_seqs(), vec![0, 1, 2, 3]);

        // ACK 0 slides past 0 only (1 still outstanding) and admits m4.
        sender.on_packet(&mut ctx, ack(0));
        assert_eq!(sender.base(), 1);
        assert_eq!(ctx.sent_data_seqs(), vec![0, 1, 2, 3, 4]);

        // ACK 1 slides past 1 and the already-recorded 2 in one step,
        // admitting m5.
        sender.on_packet(&mut ctx, ack(1));
        assert_eq!(sender.base(), 3);
        assert_eq!(ctx.sent_data_seqs(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(sender.queued(), 0);
    }

    #[test]
    fn corrupted_and_out_of_window_acks_are_ignored() {
        let mut sender = SrSender::new(&config());
        let mut ctx = RecordingContext::new();
        sender.on_app_message(&mut ctx, msg(0));
        let sends = ctx.sent.len();
        let timer_ops = ctx.timer_ops.len();

        let mut corrupted = ack(0);
        corrupted.acknum = 1; // checksum no longer matches
        sender.on_packet(&mut ctx, corrupted);

        sender.on_packet(&mut ctx, ack(7)); // never sent
        sender.on_packet(&mut ctx, ack(-3));

        assert_eq!(sender.base(), 0);
        assert_eq!(ctx.sent.len(), sends);
        assert_eq!(ctx.timer_ops.len(), timer_ops);
    }

    #[test]
    fn timer_tracks_earliest_outstanding_deadline() {
        let mut sender = SrSender::new(&config());
        let mut ctx = RecordingContext::new();

        ctx.now = 0;
        sender.on_app_message(&mut ctx, msg(0)); // deadline 400
        assert_eq!(ctx.armed_deadline(), Some(400));

        ctx.now = 100;
        sender.on_app_message(&mut ctx, msg(1)); // deadline 500
        assert_eq!(ctx.armed_deadline(), Some(400));

        ctx.now = 150;
        sender.on_packet(&mut ctx, ack(0));
        assert_eq!(ctx.armed_deadline(), Some(500));

        sender.on_packet(&mut ctx, ack(1));
        assert_eq!(ctx.armed_deadline(), None);
        assert_eq!(ctx.timer_ops.last(), Some(&TimerOp::Cancel));
    }

    #[test]
    fn timeout_retransmits_only_earliest_expired() {
        let mut sender = SrSender::new(&config());
        let mut ctx = RecordingContext::new();

        ctx.now = 0;
        sender.on_app_message(&mut ctx, msg(0)); // deadline 400
        ctx.now = 50;
        sender.on_app_message(&mut ctx, msg(1)); // deadline 450

        ctx.now = 400;
        sender.on_timer(&mut ctx);
        assert_eq!(ctx.sent_data_seqs(), vec![0, 1, 0]);
        // seq 0 rescheduled to 800, timer now waits on seq 1 at 450.
        assert_eq!(ctx.armed_deadline(), Some(450));

        ctx.now = 450;
        sender.on_timer(&mut ctx);
        assert_eq!(ctx.sent_data_seqs(), vec![0, 1, 0, 1]);
        assert_eq!(ctx.armed_deadline(), Some(800));
    }

    #[test]
    fn timer_racing_a_final_ack_is_a_noop() {
        let mut sender = SrSender::new(&config());
        let mut ctx = RecordingContext::new();
        sender.on_app_message(&mut ctx, msg(0));
        sender.on_packet(&mut ctx, ack(0));

        let sends = ctx.sent.len();
        ctx.now = 400;
        sender.on_timer(&mut ctx);
        assert_eq!(ctx.sent.len(), sends);
        assert_eq!(ctx.armed_deadline(), None);
    }

    #[test]
    fn ring_slots_are_reused_across_many_windows() {
        let mut sender = SrSender::new(&config());
        let mut ctx = RecordingContext::new();

        // Run several windows' worth of traffic through the four slots.
        for i in 0..20 {
            sender.on_app_message(&mut ctx, msg(i));
            sender.on_packet(&mut ctx, ack(i as i32));
        }
        assert_eq!(sender.base(), 20);
        assert_eq!(sender.next_seq(), 20);
        assert_eq!(ctx.sent_data_seqs(), (0..20).collect::<Vec<_>>());
    }
}
