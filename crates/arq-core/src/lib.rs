//! Selective-Repeat ARQ engine: a sliding-window sender with per-packet
//! retransmission deadlines and a receiver that buffers out-of-order
//! packets until they can be delivered in sequence.
//!
//! Both entities are event-driven and single-threaded: they only mutate
//! state inside the [`arq_abstract::ProtocolEntity`] callbacks, reaching
//! the channel, the application and their timer through the
//! [`arq_abstract::SystemContext`] handed to each call.

pub mod receiver;
pub mod sender;

pub use receiver::SrReceiver;
pub use sender::SrSender;
