//! Sliding-window send-side state machine.
//!
//! [`Sender`] maintains a window of up to [`WINDOW_SIZE`] in-flight packets.
//!
//! # Protocol contract
//!
//! - Messages from the upper layer are segmented into [`MAX_PAYLOAD`]-sized
//!   packets which queue in a backlog until the window has room.
//! - ACKs are **cumulative**: an ACK carrying `a` means the receiver has
//!   delivered every sequence up to and including `a`.
//! - On timeout, every unacknowledged packet from the ACK frontier onward is
//!   retransmitted (go back to the frontier).
//! - A single one-shot timer covers the whole window.  It is rearmed on every
//!   cumulative advance and stopped when nothing is in flight, so after every
//!   callback the timer is set exactly when some packet awaits an ACK.
//!
//! This module only manages state; the environment behind
//! [`SenderHarness`] owns the channel and the timer.
//!
//! # Sequence-number layout
//!
//! ```text
//!   ack_base      send_cursor   next_seq
//!       │              │            │
//!   ────┼──────────────┼────────────┼──────────▶ seq space
//!       │◀─ in flight ─▶◀─ admitted,─▶◀─ backlog
//!       │               not yet sent │  (unstamped)
//! ```

use std::collections::VecDeque;

use crate::harness::SenderHarness;
use crate::packet::{seq_in_range, Packet, MAX_PAYLOAD};
use crate::{RETRANSMIT_TIMEOUT, WINDOW_SIZE};

/// Send-side state for one flow.
#[derive(Debug)]
pub struct Sender {
    /// Sequence number the next admitted packet will be stamped with.
    next_seq: u32,

    /// Next sequence to hand to the lower layer (trails `next_seq` only
    /// inside a callback; the two meet again before it returns).
    send_cursor: u32,

    /// Oldest unacknowledged sequence (left window edge).
    ack_base: u32,

    /// Outstanding packets, indexed by `seq % WINDOW_SIZE`.  Slots in
    /// `[ack_base, next_seq)` are occupied; all others are empty.
    window: [Option<Packet>; WINDOW_SIZE],

    /// Segmented packets waiting for window room, oldest first.  Sequence
    /// numbers are stamped at admission, not at segmentation.
    backlog: VecDeque<Packet>,
}

impl Default for Sender {
    fn default() -> Self {
        Self::new()
    }
}

impl Sender {
    pub fn new() -> Self {
        Self {
            next_seq: 0,
            send_cursor: 0,
            ack_base: 0,
            window: [None; WINDOW_SIZE],
            backlog: VecDeque::new(),
        }
    }

    /// Number of packets awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.next_seq.wrapping_sub(self.ack_base) as usize
    }

    /// Number of segmented packets not yet admitted into the window.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Oldest unacknowledged sequence.
    pub fn ack_base(&self) -> u32 {
        self.ack_base
    }

    /// Sequence the next admitted packet will carry.
    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// `true` when every segmented packet has been acknowledged.
    pub fn is_idle(&self) -> bool {
        self.ack_base == self.next_seq && self.backlog.is_empty()
    }

    /// Upper layer hands down a message.
    ///
    /// Segments it, queues the packets, admits as many as the window allows,
    /// and arms the timer if packets just went into flight with no timer
    /// pending.
    pub fn on_message(&mut self, msg: &[u8], env: &mut impl SenderHarness) {
        for chunk in msg.chunks(MAX_PAYLOAD) {
            self.backlog.push_back(Packet::data(chunk));
        }
        log::debug!(
            "[sender] t={:.2} message len={} backlog={}",
            env.now(),
            msg.len(),
            self.backlog.len()
        );
        self.pump(env);
        if !env.is_timer_set() && self.ack_base != self.next_seq {
            env.start_timer(RETRANSMIT_TIMEOUT);
        }
    }

    /// A packet arrives from the lower layer; for the sender that is always
    /// an ACK.
    ///
    /// Corrupted frames and ACK values outside `[ack_base, next_seq)` (stale
    /// duplicates, the nothing-received sentinel, values never sent) are
    /// dropped silently.
    pub fn on_packet(&mut self, pkt: &Packet, env: &mut impl SenderHarness) {
        if !pkt.verify() {
            log::trace!("[sender] t={:.2} corrupt ACK dropped", env.now());
            return;
        }
        let ack = pkt.seq();
        if !seq_in_range(self.ack_base, ack, self.next_seq) {
            log::trace!(
                "[sender] t={:.2} stale ACK {} ignored (window [{}, {}))",
                env.now(),
                ack as i32,
                self.ack_base,
                self.next_seq
            );
            return;
        }

        // Cumulative progress: fresh timeout interval, retire the prefix.
        env.start_timer(RETRANSMIT_TIMEOUT);
        let retired = ack.wrapping_sub(self.ack_base).wrapping_add(1);
        let mut seq = self.ack_base;
        while seq != ack.wrapping_add(1) {
            self.window[seq as usize % WINDOW_SIZE] = None;
            seq = seq.wrapping_add(1);
        }
        self.ack_base = ack.wrapping_add(1);
        log::debug!(
            "[sender] t={:.2} ACK {} retired={} in_flight={}",
            env.now(),
            ack,
            retired,
            self.in_flight()
        );

        self.pump(env);
        if self.ack_base == self.next_seq {
            env.stop_timer();
        }
    }

    /// The retransmission timer fired: go back to the ACK frontier and
    /// resend everything outstanding.
    pub fn on_timeout(&mut self, env: &mut impl SenderHarness) {
        if self.ack_base == self.next_seq {
            return;
        }
        env.start_timer(RETRANSMIT_TIMEOUT);
        self.send_cursor = self.ack_base;
        log::debug!(
            "[sender] t={:.2} timeout, retransmitting {} packet(s) from seq {}",
            env.now(),
            self.in_flight(),
            self.ack_base
        );
        self.pump(env);
    }

    /// Admit backlog packets while the window has room, then transmit
    /// everything between the send cursor and the window's right edge.
    ///
    /// Admission stamps the sequence number and seals the frame; from then
    /// on the bytes are frozen, so a retransmission is byte-identical.
    fn pump(&mut self, env: &mut impl SenderHarness) {
        while self.in_flight() < WINDOW_SIZE {
            let Some(mut pkt) = self.backlog.pop_front() else {
                break;
            };
            pkt.set_seq(self.next_seq);
            pkt.seal();
            self.window[self.next_seq as usize % WINDOW_SIZE] = Some(pkt);
            self.next_seq = self.next_seq.wrapping_add(1);
        }
        while self.send_cursor != self.next_seq {
            if let Some(pkt) = &self.window[self.send_cursor as usize % WINDOW_SIZE] {
                env.send_to_lower(pkt);
            }
            self.send_cursor = self.send_cursor.wrapping_add(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
