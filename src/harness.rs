//! Environment traits the state machines are driven through.
//!
//! [`crate::sender::Sender`] and [`crate::receiver::Receiver`] only manage
//! state; every outward effect of a callback flows through these traits, so
//! whatever drives the endpoints (the discrete-event simulation in
//! [`crate::simulator`], or a recording mock in tests) decides what a packet
//! send, a timer command, or an upstream delivery actually does.
//!
//! The contract is single-threaded and edge-triggered: a callback runs to
//! completion before the next event is dispatched, none of these operations
//! block, and timer commands take effect immediately from inside a callback.

use crate::packet::Packet;

/// Operations the environment provides to the send-side state machine.
pub trait SenderHarness {
    /// Hand a frame to the unreliable channel.  The channel copies the
    /// bytes; the caller keeps ownership.  Never blocks, never fails.
    fn send_to_lower(&mut self, pkt: &Packet);

    /// Current simulated time in seconds.
    fn now(&self) -> f64;

    /// Arm the single one-shot retransmission timer `interval` seconds from
    /// now, replacing any prior arming.
    fn start_timer(&mut self, interval: f64);

    /// Cancel the timer without firing.
    fn stop_timer(&mut self);

    /// Whether a timer arming is currently pending.
    fn is_timer_set(&self) -> bool;
}

/// Operations the environment provides to the receive-side state machine.
pub trait ReceiverHarness {
    /// Hand a frame (here always an ACK) to the unreliable channel.
    fn send_to_lower(&mut self, pkt: &Packet);

    /// Deliver a reassembled message to the upper layer, transferring
    /// ownership of the bytes.  Never blocks.
    fn deliver_to_upper(&mut self, msg: Vec<u8>);

    /// Current simulated time in seconds.
    fn now(&self) -> f64;
}
