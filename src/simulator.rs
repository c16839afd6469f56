//! Discrete-event channel simulation for deterministic testing.
//!
//! Real channels drop, reorder, and duplicate packets.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! this module owns one [`Sender`] and one [`Receiver`], a virtual clock, and
//! an event queue, and applies a configurable fault model to every packet
//! handed to the lower layer:
//!
//! | Fault            | Description                                       |
//! |------------------|---------------------------------------------------|
//! | Packet loss      | Drop a packet with probability `loss_rate`.       |
//! | Corruption       | Flip one random bit with probability              |
//! |                  | `corrupt_rate`.                                   |
//! | Reordering       | Delay a packet by `reorder_delay`, letting later  |
//! |                  | packets overtake it.                              |
//! | Duplication      | Deliver a packet twice.                           |
//!
//! All faults draw from a seeded RNG, so failures are reproducible from the
//! seed alone.
//!
//! The simulation also plays the role of the workload checker: it records
//! every byte submitted to the sender and every message delivered by the
//! receiver, and [`Simulator::verify`] confirms the delivered stream is
//! exactly the submitted stream.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::harness::{ReceiverHarness, SenderHarness};
use crate::packet::{Packet, PKT_SIZE};
use crate::receiver::Receiver;
use crate::sender::Sender;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Fault-injection and channel parameters.  All probabilities are in
/// `[0.0, 1.0]` and apply independently to every transmitted packet, in both
/// directions.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given packet is silently dropped.
    pub loss_rate: f64,
    /// Probability that one random bit of a packet is flipped in transit.
    pub corrupt_rate: f64,
    /// Probability that a packet is held back long enough for later packets
    /// to overtake it.
    pub reorder_rate: f64,
    /// Extra delay applied to reordered packets, in simulated seconds.
    pub reorder_delay: f64,
    /// Probability that a packet is delivered twice.
    pub duplicate_rate: f64,
    /// One-way channel latency in simulated seconds.
    pub latency: f64,
    /// RNG seed; identical seeds replay identical fault patterns.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: the channel is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            reorder_rate: 0.0,
            reorder_delay: 0.5,
            duplicate_rate: 0.0,
            latency: 0.1,
            seed: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Outcome failures a simulation run can report.
///
/// The protocol core itself never surfaces errors (corruption and loss are
/// its job to mask); these describe the run as a whole.
#[derive(Debug, Error)]
pub enum SimError {
    /// The run hit its time budget with bytes still undelivered.
    #[error("transfer stalled: {undelivered} byte(s) undelivered at t={at:.2}")]
    Stalled { undelivered: usize, at: f64 },

    /// The delivered stream is not a prefix of the submitted stream.
    #[error("delivered stream diverges from submitted stream at byte {offset}")]
    Divergence { offset: usize },
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Counters accumulated over one run.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    /// Data packets the sender handed to the channel (including
    /// retransmissions).
    pub data_sent: u64,
    /// ACK packets the receiver handed to the channel.
    pub acks_sent: u64,
    /// Packets the channel dropped.
    pub lost: u64,
    /// Packets the channel corrupted.
    pub corrupted: u64,
    /// Packets the channel delayed past their successors.
    pub reordered: u64,
    /// Packets the channel delivered twice.
    pub duplicated: u64,
    /// Retransmission timer firings.
    pub timeouts: u64,
    /// Messages delivered to the upper layer.
    pub delivered_msgs: u64,
    /// Total bytes delivered to the upper layer.
    pub delivered_bytes: u64,
}

// ---------------------------------------------------------------------------
// Event queue
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Event {
    /// The upper layer hands a message to the sender.
    Submit(Vec<u8>),
    /// A data packet reaches the receiver.
    ArriveAtReceiver(Packet),
    /// An ACK packet reaches the sender.
    ArriveAtSender(Packet),
    /// The sender's one-shot timer fires, if `arming` is still current.
    Timeout { arming: u64 },
}

#[derive(Debug)]
struct Scheduled {
    at: f64,
    /// FIFO tie-break for events scheduled at the same instant.
    tick: u64,
    event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .total_cmp(&other.at)
            .then_with(|| self.tick.cmp(&other.tick))
    }
}

// ---------------------------------------------------------------------------
// Per-callback harness contexts
// ---------------------------------------------------------------------------

/// Timer command recorded by a sender callback; the last one wins, exactly
/// as repeated arming of a real one-shot timer would.
#[derive(Debug, Clone, Copy)]
enum TimerCmd {
    Start(f64),
    Stop,
}

/// Collects the effects of one sender callback.  Implements the harness so
/// timer commands are visible to the callback itself immediately, then is
/// applied to the event queue once the callback returns.
struct SenderCtx {
    clock: f64,
    was_timer_set: bool,
    timer_cmd: Option<TimerCmd>,
    outbound: Vec<Packet>,
}

impl SenderCtx {
    fn new(clock: f64, was_timer_set: bool) -> Self {
        Self {
            clock,
            was_timer_set,
            timer_cmd: None,
            outbound: Vec::new(),
        }
    }
}

impl SenderHarness for SenderCtx {
    fn send_to_lower(&mut self, pkt: &Packet) {
        self.outbound.push(*pkt);
    }
    fn now(&self) -> f64 {
        self.clock
    }
    fn start_timer(&mut self, interval: f64) {
        self.timer_cmd = Some(TimerCmd::Start(interval));
    }
    fn stop_timer(&mut self) {
        self.timer_cmd = Some(TimerCmd::Stop);
    }
    fn is_timer_set(&self) -> bool {
        match self.timer_cmd {
            Some(TimerCmd::Start(_)) => true,
            Some(TimerCmd::Stop) => false,
            None => self.was_timer_set,
        }
    }
}

/// Collects the effects of one receiver callback.
struct ReceiverCtx {
    clock: f64,
    outbound: Vec<Packet>,
    delivered: Vec<Vec<u8>>,
}

impl ReceiverCtx {
    fn new(clock: f64) -> Self {
        Self {
            clock,
            outbound: Vec::new(),
            delivered: Vec::new(),
        }
    }
}

impl ReceiverHarness for ReceiverCtx {
    fn send_to_lower(&mut self, pkt: &Packet) {
        self.outbound.push(*pkt);
    }
    fn deliver_to_upper(&mut self, msg: Vec<u8>) {
        self.delivered.push(msg);
    }
    fn now(&self) -> f64 {
        self.clock
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Direction {
    ToReceiver,
    ToSender,
}

/// One sender, one receiver, and the lossy channel between them, driven on a
/// virtual clock.
pub struct Simulator {
    config: SimulatorConfig,
    rng: StdRng,

    clock: f64,
    tick: u64,
    queue: BinaryHeap<Reverse<Scheduled>>,

    sender: Sender,
    receiver: Receiver,

    /// Whether a timer arming is pending, and its generation.  Starting or
    /// stopping bumps the generation, orphaning any scheduled firing.
    timer_set: bool,
    timer_arming: u64,

    submitted: Vec<u8>,
    delivered: Vec<Vec<u8>>,
    stats: Stats,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        log::info!(
            "[sim] t=0.00 initialized (loss={} corrupt={} reorder={} dup={} seed={})",
            config.loss_rate,
            config.corrupt_rate,
            config.reorder_rate,
            config.duplicate_rate,
            config.seed
        );
        Self {
            config,
            rng,
            clock: 0.0,
            tick: 0,
            queue: BinaryHeap::new(),
            sender: Sender::new(),
            receiver: Receiver::new(),
            timer_set: false,
            timer_arming: 0,
            submitted: Vec::new(),
            delivered: Vec::new(),
            stats: Stats::default(),
        }
    }

    /// Schedule the upper layer to hand `msg` to the sender at time `at`.
    pub fn submit_at(&mut self, at: f64, msg: &[u8]) {
        self.schedule(at, Event::Submit(msg.to_vec()));
    }

    /// Current simulated time.
    pub fn now(&self) -> f64 {
        self.clock
    }

    /// Counters for the run so far.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Messages delivered to the upper layer, in delivery order.
    pub fn delivered(&self) -> &[Vec<u8>] {
        &self.delivered
    }

    /// The delivered messages concatenated into one stream.
    pub fn delivered_bytes(&self) -> Vec<u8> {
        self.delivered.concat()
    }

    /// Every byte submitted to the sender so far, in submission order.
    pub fn submitted_bytes(&self) -> &[u8] {
        &self.submitted
    }

    /// Run until the event queue drains or the clock passes `deadline`.
    ///
    /// A run with outstanding data keeps generating timeout events, so the
    /// queue only drains once everything submitted has been acknowledged.
    pub fn run(&mut self, deadline: f64) {
        while let Some(Reverse(head)) = self.queue.peek() {
            if head.at > deadline {
                break;
            }
            let Some(Reverse(next)) = self.queue.pop() else {
                break;
            };
            self.clock = self.clock.max(next.at);
            self.dispatch(next.event);
        }
        log::info!(
            "[sim] t={:.2} run finished: {} msg(s) / {} byte(s) delivered",
            self.clock,
            self.stats.delivered_msgs,
            self.stats.delivered_bytes
        );
    }

    /// Check the outcome: the delivered stream must equal the submitted
    /// stream, byte for byte and in full.
    pub fn verify(&self) -> Result<(), SimError> {
        let delivered = self.delivered_bytes();
        if let Some(offset) = delivered
            .iter()
            .zip(self.submitted.iter())
            .position(|(d, s)| d != s)
        {
            return Err(SimError::Divergence { offset });
        }
        if delivered.len() > self.submitted.len() {
            return Err(SimError::Divergence {
                offset: self.submitted.len(),
            });
        }
        if delivered.len() < self.submitted.len() {
            return Err(SimError::Stalled {
                undelivered: self.submitted.len() - delivered.len(),
                at: self.clock,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Event dispatch
    // -----------------------------------------------------------------------

    fn schedule(&mut self, at: f64, event: Event) {
        self.queue.push(Reverse(Scheduled {
            at,
            tick: self.tick,
            event,
        }));
        self.tick += 1;
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Submit(msg) => {
                self.submitted.extend_from_slice(&msg);
                let mut ctx = SenderCtx::new(self.clock, self.timer_set);
                self.sender.on_message(&msg, &mut ctx);
                self.apply_sender_ctx(ctx);
            }
            Event::ArriveAtSender(pkt) => {
                let mut ctx = SenderCtx::new(self.clock, self.timer_set);
                self.sender.on_packet(&pkt, &mut ctx);
                self.apply_sender_ctx(ctx);
            }
            Event::ArriveAtReceiver(pkt) => {
                let mut ctx = ReceiverCtx::new(self.clock);
                self.receiver.on_packet(&pkt, &mut ctx);
                for ack in ctx.outbound {
                    self.transmit(ack, Direction::ToSender);
                }
                for msg in ctx.delivered {
                    self.stats.delivered_msgs += 1;
                    self.stats.delivered_bytes += msg.len() as u64;
                    self.delivered.push(msg);
                }
            }
            Event::Timeout { arming } => {
                if arming != self.timer_arming || !self.timer_set {
                    return; // orphaned by a later start/stop
                }
                self.timer_set = false; // one-shot: the arming is consumed
                self.stats.timeouts += 1;
                let mut ctx = SenderCtx::new(self.clock, false);
                self.sender.on_timeout(&mut ctx);
                self.apply_sender_ctx(ctx);
            }
        }
    }

    fn apply_sender_ctx(&mut self, ctx: SenderCtx) {
        match ctx.timer_cmd {
            Some(TimerCmd::Start(interval)) => {
                self.timer_arming += 1;
                self.timer_set = true;
                let arming = self.timer_arming;
                self.schedule(self.clock + interval, Event::Timeout { arming });
            }
            Some(TimerCmd::Stop) => {
                self.timer_arming += 1;
                self.timer_set = false;
            }
            None => {}
        }
        for pkt in ctx.outbound {
            self.transmit(pkt, Direction::ToReceiver);
        }
    }

    // -----------------------------------------------------------------------
    // Channel fault model
    // -----------------------------------------------------------------------

    fn transmit(&mut self, pkt: Packet, dir: Direction) {
        match dir {
            Direction::ToReceiver => self.stats.data_sent += 1,
            Direction::ToSender => self.stats.acks_sent += 1,
        }

        if self.config.loss_rate > 0.0 && self.rng.random_bool(self.config.loss_rate) {
            self.stats.lost += 1;
            log::trace!("[sim] t={:.2} channel dropped a packet", self.clock);
            return;
        }

        let mut pkt = pkt;
        if self.config.corrupt_rate > 0.0 && self.rng.random_bool(self.config.corrupt_rate) {
            let bit = self.rng.random_range(0..PKT_SIZE * 8);
            let mut raw = *pkt.as_bytes();
            raw[bit / 8] ^= 1 << (bit % 8);
            pkt = Packet::from_bytes(raw);
            self.stats.corrupted += 1;
            log::trace!("[sim] t={:.2} channel flipped bit {}", self.clock, bit);
        }

        let mut delay = self.config.latency;
        if self.config.reorder_rate > 0.0 && self.rng.random_bool(self.config.reorder_rate) {
            delay += self.config.reorder_delay;
            self.stats.reordered += 1;
        }
        self.deliver(pkt, dir, self.clock + delay);

        if self.config.duplicate_rate > 0.0 && self.rng.random_bool(self.config.duplicate_rate) {
            self.stats.duplicated += 1;
            self.deliver(pkt, dir, self.clock + delay + self.config.latency * 0.5);
        }
    }

    fn deliver(&mut self, pkt: Packet, dir: Direction, at: f64) {
        let event = match dir {
            Direction::ToReceiver => Event::ArriveAtReceiver(pkt),
            Direction::ToSender => Event::ArriveAtSender(pkt),
        };
        self.schedule(at, event);
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
