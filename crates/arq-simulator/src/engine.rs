use crate::trace::SimulationReport;
use arq_abstract::{Message, Packet, ProtocolConfig, SimConfig};
use arq_abstract::{ProtocolEntity, SystemContext};
use rand::Rng;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    Sender,
    Receiver,
}

impl NodeId {
    pub fn peer(&self) -> Self {
        match self {
            NodeId::Sender => NodeId::Receiver,
            NodeId::Receiver => NodeId::Sender,
        }
    }
}

#[derive(Debug)]
pub enum EventType {
    PacketArrival {
        to: NodeId,
        packet: Packet,
    },
    /// The single-shot timer of `node`. `generation` stamps the arming
    /// request; a cancel or re-arm bumps the node's counter so stale
    /// expirations are recognized and skipped.
    TimerExpiry {
        node: NodeId,
        generation: u64,
    },
    AppSend {
        message: Message,
    },
}

#[derive(Debug)]
struct Event {
    time: u64,
    event_type: EventType,
    id: u64, // Unique ID to differentiate events at same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for time: smallest time is Greater in BinaryHeap
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// A compact textual summary of important link-layer events.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time: u64,
    pub description: String,
}

/// Actions buffered during an entity's callback. Each entity owns one
/// single-shot timer, so a start request replaces whatever was pending.
#[derive(Default)]
struct ActionBuffer {
    outgoing_packets: Vec<Packet>,
    timer_start: Option<u64>,
    timer_cancel: bool,
    logs: Vec<String>,
    delivered_data: Vec<Vec<u8>>,
}

/// Context implementation passed to the entity
struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    now: u64,
}

impl<'a> SystemContext for ScopedContext<'a> {
    fn send_packet(&mut self, packet: Packet) {
        self.buffer.outgoing_packets.push(packet);
    }

    fn start_timer(&mut self, delay: u64) {
        // Last request wins within a single callback.
        self.buffer.timer_start = Some(delay);
    }

    fn cancel_timer(&mut self) {
        self.buffer.timer_cancel = true;
        self.buffer.timer_start = None;
    }

    fn deliver_data(&mut self, payload: &[u8]) {
        self.buffer.delivered_data.push(payload.to_vec());
    }

    fn log(&mut self, message: &str) {
        self.buffer.logs.push(message.to_string());
    }

    fn now(&self) -> u64 {
        self.now
    }
}

pub struct Simulator {
    time: u64,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,

    config: SimConfig,
    protocol: ProtocolConfig,
    rng: rand::rngs::StdRng,

    // We hold the two entities directly
    // We use Box to allow different implementations
    pub sender: Box<dyn ProtocolEntity>,
    pub receiver: Box<dyn ProtocolEntity>,

    // Run statistics
    pub delivered_data: Vec<Vec<u8>>,
    pub sender_packet_count: u32,
    pub receiver_packet_count: u32,

    // Deterministic fault injection: drop first DATA packet with given seq numbers
    drop_data_seq_once: Vec<i32>,
    // Deterministic fault injection: drop first ACK with given ack numbers
    drop_ack_once: Vec<i32>,

    /// Timeline of link events (drops, corruptions, sends, deliveries).
    pub link_events: Vec<LinkEventSummary>,

    /// Per-node timer generation counters; a pending expiry whose stamp
    /// no longer matches has been cancelled or replaced.
    timer_generations: [u64; 2],
}

impl Simulator {
    pub fn new(
        config: SimConfig,
        protocol: ProtocolConfig,
        sender: Box<dyn ProtocolEntity>,
        receiver: Box<dyn ProtocolEntity>,
    ) -> Self {
        use rand::SeedableRng;
        let rng = rand::rngs::StdRng::seed_from_u64(config.seed);

        Self {
            time: 0,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            config,
            protocol,
            rng,
            sender,
            receiver,
            delivered_data: Vec::new(),
            sender_packet_count: 0,
            receiver_packet_count: 0,
            drop_data_seq_once: Vec::new(),
            drop_ack_once: Vec::new(),
            link_events: Vec::new(),
            timer_generations: [0, 0],
        }
    }

    /// Register a deterministic fault: drop the first DATA packet whose seq equals `seq`.
    pub fn add_drop_data_seq_once(&mut self, seq: i32) {
        self.drop_data_seq_once.push(seq);
    }

    /// Register a deterministic fault: drop the first ACK whose acknum equals `ack`.
    pub fn add_drop_ack_once(&mut self, ack: i32) {
        self.drop_ack_once.push(ack);
    }

    fn node_index(node: NodeId) -> usize {
        match node {
            NodeId::Sender => 0,
            NodeId::Receiver => 1,
        }
    }

    fn push_event(&mut self, time: u64, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    pub fn schedule_app_send(&mut self, time: u64, message: Message) {
        self.push_event(time, EventType::AppSend { message });
    }

    pub fn init(&mut self) {
        // Init phase
        {
            let mut buffer = ActionBuffer::default();
            let mut ctx = ScopedContext {
                buffer: &mut buffer,
                now: self.time,
            };
            self.sender.init(&mut ctx);
            self.process_actions(NodeId::Sender, buffer);
        }
        {
            let mut buffer = ActionBuffer::default();
            let mut ctx = ScopedContext {
                buffer: &mut buffer,
                now: self.time,
            };
            self.receiver.init(&mut ctx);
            self.process_actions(NodeId::Receiver, buffer);
        }
    }

    pub fn current_time(&self) -> u64 {
        self.time
    }

    /// Process the next event. Returns true if an event was processed, false if queue is empty.
    pub fn step(&mut self) -> bool {
        let event = match self.event_queue.pop() {
            Some(e) => e,
            None => return false,
        };

        self.time = event.time;
        debug!("Processing event at {}: {:?}", self.time, event.event_type);

        match event.event_type {
            EventType::PacketArrival { to, packet } => {
                let mut buffer = ActionBuffer::default();
                {
                    let mut ctx = ScopedContext {
                        buffer: &mut buffer,
                        now: self.time,
                    };
                    match to {
                        NodeId::Sender => self.sender.on_packet(&mut ctx, packet),
                        NodeId::Receiver => self.receiver.on_packet(&mut ctx, packet),
                    }
                }
                self.process_actions(to, buffer);
            }
            EventType::TimerExpiry { node, generation } => {
                // A cancel or re-arm after this expiry was scheduled has
                // bumped the node's counter; such an event is stale.
                if self.timer_generations[Self::node_index(node)] != generation {
                    debug!("Skipping stale timer event for {:?}", node);
                    return true; // Event processed (by being ignored)
                }

                let mut buffer = ActionBuffer::default();
                {
                    let mut ctx = ScopedContext {
                        buffer: &mut buffer,
                        now: self.time,
                    };
                    match node {
                        NodeId::Sender => self.sender.on_timer(&mut ctx),
                        NodeId::Receiver => self.receiver.on_timer(&mut ctx),
                    }
                }
                self.process_actions(node, buffer);
            }
            EventType::AppSend { message } => {
                let mut buffer = ActionBuffer::default();
                {
                    let mut ctx = ScopedContext {
                        buffer: &mut buffer,
                        now: self.time,
                    };
                    self.sender.on_app_message(&mut ctx, message);
                }
                self.process_actions(NodeId::Sender, buffer);
            }
        }
        true
    }

    /// Produce a serializable snapshot of the finished run.
    pub fn export_report(&self) -> SimulationReport {
        SimulationReport {
            config: self.config.clone(),
            protocol: self.protocol.clone(),
            duration_ms: self.time,
            delivered_data: self.delivered_data.clone(),
            sender_packet_count: self.sender_packet_count,
            receiver_packet_count: self.receiver_packet_count,
            link_events: self.link_events.clone(),
        }
    }

    pub fn run_until_complete(&mut self) {
        self.init();
        while self.step() {}
    }

    /// Corrupt a packet in place: flip bits in a random header field or
    /// payload byte, leaving the recorded checksum untouched so the
    /// receiving entity's verification catches the mismatch (unless the
    /// flips cancel in the additive sum, which the protocol accepts).
    fn corrupt(&mut self, packet: &mut Packet) {
        match self.rng.random_range(0..4) {
            0 => packet.seqnum ^= 1 << self.rng.random_range(0..16),
            1 => packet.acknum ^= 1 << self.rng.random_range(0..16),
            2 => packet.checksum ^= 1 << self.rng.random_range(0..16),
            _ => {
                let index = self.rng.random_range(0..packet.payload.len());
                packet.payload[index] ^= 1 << self.rng.random_range(0..8);
            }
        }
    }

    fn process_actions(&mut self, source_node: NodeId, buffer: ActionBuffer) {
        for log in buffer.logs {
            info!("[{:?}] {}", source_node, log);
        }

        for data in buffer.delivered_data {
            info!("[{:?}] DELIVERED DATA: {} bytes", source_node, data.len());
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "[{:?}] DELIVERED {} bytes to application",
                    source_node,
                    data.len()
                ),
            });
            self.delivered_data.push(data);
        }

        // Timer bookkeeping: cancel and re-arm both invalidate whatever
        // expiry is pending, so either bumps the generation. A start then
        // schedules a fresh expiry under the new stamp.
        let node = Self::node_index(source_node);
        if buffer.timer_cancel || buffer.timer_start.is_some() {
            self.timer_generations[node] += 1;
        }
        if let Some(delay) = buffer.timer_start {
            let generation = self.timer_generations[node];
            self.push_event(
                self.time + delay,
                EventType::TimerExpiry {
                    node: source_node,
                    generation,
                },
            );
        }

        // Packet transmission logic (Channel)
        for mut packet in buffer.outgoing_packets {
            match source_node {
                NodeId::Sender => self.sender_packet_count += 1,
                NodeId::Receiver => self.receiver_packet_count += 1,
            }

            // Deterministic tests: optionally drop first DATA with given seq
            if !packet.is_ack()
                && let Some(pos) = self
                    .drop_data_seq_once
                    .iter()
                    .position(|s| *s == packet.seqnum)
            {
                self.link_events.push(LinkEventSummary {
                    time: self.time,
                    description: format!(
                        "[Sender->Receiver] DROP (deterministic seq) seq={}",
                        packet.seqnum
                    ),
                });
                debug!(
                    "Deterministically dropping DATA packet with seq={}",
                    packet.seqnum
                );
                self.drop_data_seq_once.remove(pos);
                continue;
            }

            // Deterministic tests: optionally drop first ACK with given ack number
            if packet.is_ack()
                && let Some(pos) = self.drop_ack_once.iter().position(|a| *a == packet.acknum)
            {
                self.link_events.push(LinkEventSummary {
                    time: self.time,
                    description: format!(
                        "[Receiver->Sender] DROP (deterministic ack) ack={}",
                        packet.acknum
                    ),
                });
                debug!("Deterministically dropping ACK with ack={}", packet.acknum);
                self.drop_ack_once.remove(pos);
                continue;
            }

            // 1. Check Loss
            if self.rng.random::<f64>() < self.config.loss_rate {
                self.link_events.push(LinkEventSummary {
                    time: self.time,
                    description: format!(
                        "[{:?}->{:?}] DROP (random loss) seq={} ack={}",
                        source_node,
                        source_node.peer(),
                        packet.seqnum,
                        packet.acknum
                    ),
                });
                debug!("Packet lost in channel");
                continue;
            }

            // 2. Check Corruption
            if self.rng.random::<f64>() < self.config.corrupt_rate {
                self.link_events.push(LinkEventSummary {
                    time: self.time,
                    description: format!(
                        "[{:?}->{:?}] CORRUPT seq={} ack={}",
                        source_node,
                        source_node.peer(),
                        packet.seqnum,
                        packet.acknum
                    ),
                });
                debug!("Packet corrupted in channel");
                self.corrupt(&mut packet);
            }

            // 3. Calculate Latency
            let latency = self
                .rng
                .random_range(self.config.min_latency..=self.config.max_latency);
            let arrival_time = self.time + latency;

            // 4. Target Node
            let target_node = source_node.peer();

            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "[{:?}->{:?}] SEND seq={} ack={} (latency={}ms)",
                    source_node, target_node, packet.seqnum, packet.acknum, latency
                ),
            });

            self.push_event(
                arrival_time,
                EventType::PacketArrival {
                    to: target_node,
                    packet,
                },
            );
        }
    }
}
