//! Reorder-buffer receive-side state machine.
//!
//! [`Receiver`] accepts validated packets in any order, buffers those that
//! arrive ahead of the next expected sequence, and delivers the longest
//! contiguous prefix upstream:
//!
//! - A packet carrying exactly the expected sequence is delivered at once,
//!   followed by every contiguously buffered successor.
//! - A packet up to [`WINDOW_SIZE`] − 1 sequences ahead is parked in a ring
//!   slot; duplicates of a parked packet are discarded.
//! - Anything older (already delivered) or beyond the window is dropped.
//!
//! Every accepted-or-dropped packet with a valid checksum is answered with a
//! **cumulative ACK** naming the newest contiguously delivered sequence, so
//! the sender learns the frontier even when the packet itself was redundant.
//! Corrupted frames are dropped without an ACK; the sender's timeout covers
//! them.
//!
//! This module only manages state; the environment behind
//! [`ReceiverHarness`] owns the channel and the upper layer.

use crate::harness::ReceiverHarness;
use crate::packet::Packet;
use crate::WINDOW_SIZE;

/// Receive-side state for one flow.
#[derive(Debug)]
pub struct Receiver {
    /// Smallest sequence not yet delivered upstream.
    expected: u32,

    /// Out-of-order packets parked until the gap before them fills, indexed
    /// by `seq % WINDOW_SIZE`.  The slot at `expected % WINDOW_SIZE` is
    /// always empty.
    slots: [Option<Packet>; WINDOW_SIZE],
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Receiver {
    pub fn new() -> Self {
        Self {
            expected: 0,
            slots: [None; WINDOW_SIZE],
        }
    }

    /// Smallest sequence not yet delivered upstream.
    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// Cumulative ACK value for the current frontier: the newest
    /// contiguously delivered sequence, or `u32::MAX` before any delivery.
    pub fn ack_value(&self) -> u32 {
        self.expected.wrapping_sub(1)
    }

    /// A packet arrives from the lower layer.
    pub fn on_packet(&mut self, pkt: &Packet, env: &mut impl ReceiverHarness) {
        if !pkt.verify() {
            log::trace!("[receiver] t={:.2} corrupt packet dropped", env.now());
            return;
        }

        let seq = pkt.seq();
        let offset = seq.wrapping_sub(self.expected);
        if offset == 0 {
            // The frontier packet: deliver it, then drain everything that
            // became contiguous behind it.
            self.deliver(pkt, env);
            self.expected = self.expected.wrapping_add(1);
            while let Some(parked) = self.slots[self.expected as usize % WINDOW_SIZE].take() {
                self.deliver(&parked, env);
                self.expected = self.expected.wrapping_add(1);
            }
        } else if (offset as usize) < WINDOW_SIZE {
            // Ahead of the frontier but inside the window: park a copy,
            // first arrival wins.
            let slot = &mut self.slots[seq as usize % WINDOW_SIZE];
            if slot.is_none() {
                *slot = Some(*pkt);
                log::debug!(
                    "[receiver] t={:.2} parked seq={} (expected {})",
                    env.now(),
                    seq,
                    self.expected
                );
            }
        } else {
            log::trace!(
                "[receiver] t={:.2} seq={} outside window (expected {})",
                env.now(),
                seq,
                self.expected
            );
        }

        let ack = self.ack_value();
        env.send_to_lower(&Packet::ack(ack));
        log::debug!("[receiver] t={:.2} ACK {}", env.now(), ack as i32);
    }

    /// Copy the packet's payload into a fresh message and hand it upstream.
    fn deliver(&self, pkt: &Packet, env: &mut impl ReceiverHarness) {
        log::debug!(
            "[receiver] t={:.2} delivering seq={} len={}",
            env.now(),
            pkt.seq(),
            pkt.payload_size()
        );
        env.deliver_to_upper(pkt.payload().to_vec());
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
