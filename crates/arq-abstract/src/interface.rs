use crate::packet::{Message, Packet};

/// The capability surface the substrate provides to a protocol entity.
/// Entities call these methods to reach the network, the application
/// layer above them, and their single-shot timer.
pub trait SystemContext {
    /// Hand a packet to the unreliable channel towards the peer entity.
    fn send_packet(&mut self, packet: Packet);

    /// Arm this entity's timer to fire after `delay` simulated
    /// milliseconds. At most one timer is live per entity: arming while a
    /// timer is pending replaces it, it never stacks.
    fn start_timer(&mut self, delay: u64);

    /// Cancel the pending timer, if any.
    fn cancel_timer(&mut self);

    /// Deliver a verified, in-order payload up to the application layer.
    fn deliver_data(&mut self, payload: &[u8]);

    /// Log a line attributed to this entity in the substrate's output.
    fn log(&mut self, message: &str);

    /// Current simulated time in milliseconds. Monotonic.
    fn now(&self) -> u64;
}

/// The event callbacks a protocol entity exposes to the substrate.
///
/// The transfer is simplex: only the sender sees application messages and
/// timer expirations, so those callbacks default to no-ops.
pub trait ProtocolEntity {
    /// Called once before any other callback.
    fn init(&mut self, _ctx: &mut dyn SystemContext) {}

    /// Called when the application submits a message for reliable
    /// transfer (sender side only).
    fn on_app_message(&mut self, _ctx: &mut dyn SystemContext, _message: Message) {}

    /// Called when a packet arrives from the channel.
    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet);

    /// Called when this entity's timer expires (sender side only).
    fn on_timer(&mut self, _ctx: &mut dyn SystemContext) {}
}
