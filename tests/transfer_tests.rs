//! End-to-end tests for the sliding-window transfer protocol.
//!
//! The first group scripts adversarial channel behavior by hand: packets are
//! ferried between a [`Sender`] and a [`Receiver`] through recording
//! environments, and the script decides what gets lost, reordered, or
//! corrupted, and when the timer fires.  The second group runs randomized
//! workloads through the seeded [`Simulator`] and checks the delivered
//! stream.

use reliable_transfer::harness::{ReceiverHarness, SenderHarness};
use reliable_transfer::packet::{Packet, MAX_PAYLOAD};
use reliable_transfer::receiver::Receiver;
use reliable_transfer::sender::Sender;
use reliable_transfer::simulator::{Simulator, SimulatorConfig};
use reliable_transfer::WINDOW_SIZE;

// ---------------------------------------------------------------------------
// Scripted-channel helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SenderEnv {
    sent: Vec<Packet>,
    timer_set: bool,
    clock: f64,
}

impl SenderEnv {
    /// Take every packet handed to the channel since the last call.
    fn drain(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.sent)
    }
}

impl SenderHarness for SenderEnv {
    fn send_to_lower(&mut self, pkt: &Packet) {
        self.sent.push(*pkt);
    }
    fn now(&self) -> f64 {
        self.clock
    }
    fn start_timer(&mut self, _interval: f64) {
        self.timer_set = true;
    }
    fn stop_timer(&mut self) {
        self.timer_set = false;
    }
    fn is_timer_set(&self) -> bool {
        self.timer_set
    }
}

#[derive(Default)]
struct ReceiverEnv {
    acks: Vec<Packet>,
    delivered: Vec<Vec<u8>>,
    clock: f64,
}

impl ReceiverEnv {
    fn drain_acks(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.acks)
    }

    fn delivered_bytes(&self) -> Vec<u8> {
        self.delivered.concat()
    }
}

impl ReceiverHarness for ReceiverEnv {
    fn send_to_lower(&mut self, pkt: &Packet) {
        self.acks.push(*pkt);
    }
    fn deliver_to_upper(&mut self, msg: Vec<u8>) {
        self.delivered.push(msg);
    }
    fn now(&self) -> f64 {
        self.clock
    }
}

/// A sender/receiver pair with a hand-driven channel between them.
#[derive(Default)]
struct Pair {
    sender: Sender,
    receiver: Receiver,
    s_env: SenderEnv,
    r_env: ReceiverEnv,
}

impl Pair {
    /// Deliver `pkt` to the receiver and return the ACKs it emitted.
    fn to_receiver(&mut self, pkt: &Packet) -> Vec<Packet> {
        self.receiver.on_packet(pkt, &mut self.r_env);
        self.r_env.drain_acks()
    }

    /// Deliver every packet (and every ACK coming back) without faults.
    fn ferry_all(&mut self, pkts: Vec<Packet>) {
        for pkt in pkts {
            for ack in self.to_receiver(&pkt) {
                self.sender.on_packet(&ack, &mut self.s_env);
            }
        }
    }

    /// A message of exactly `n` packets' worth of distinguishable bytes.
    fn patterned(n: usize) -> Vec<u8> {
        (0..n * MAX_PAYLOAD).map(|i| (i % 251) as u8).collect()
    }
}

// ---------------------------------------------------------------------------
// Scripted scenarios
// ---------------------------------------------------------------------------

#[test]
fn perfect_channel_round_trip() {
    let mut p = Pair::default();
    let msg: Vec<u8> = (0..200u32).map(|i| i as u8).collect();

    p.sender.on_message(&msg, &mut p.s_env);
    let pkts = p.s_env.drain();
    assert_eq!(pkts.len(), 2);
    assert_eq!(pkts[0].payload_size(), 119);
    assert_eq!(pkts[1].payload_size(), 81);

    p.ferry_all(pkts);
    assert_eq!(p.r_env.delivered_bytes(), msg);
    assert!(p.sender.is_idle());
    assert!(!p.s_env.timer_set);
}

#[test]
fn single_packet_loss_recovers_by_timeout() {
    let mut p = Pair::default();
    p.sender.on_message(&Pair::patterned(10), &mut p.s_env);
    let pkts = p.s_env.drain();
    assert_eq!(pkts.len(), 10);

    // The channel swallows seq 3; everything else arrives.
    let mut acks = Vec::new();
    for pkt in pkts.iter().filter(|pkt| pkt.seq() != 3) {
        acks.extend(p.to_receiver(pkt));
    }

    // 0..2 delivered; every packet after the gap re-ACKs the frontier.
    assert_eq!(p.r_env.delivered.len(), 3);
    let values: Vec<u32> = acks.iter().map(Packet::seq).collect();
    assert_eq!(values, vec![0, 1, 2, 2, 2, 2, 2, 2, 2]);

    for ack in acks {
        p.sender.on_packet(&ack, &mut p.s_env);
    }
    assert_eq!(p.sender.ack_base(), 3);
    assert!(p.s_env.timer_set);

    // Timeout: the sender goes back to the frontier and resends 3..9.
    p.s_env.drain();
    p.sender.on_timeout(&mut p.s_env);
    let resent = p.s_env.drain();
    let seqs: Vec<u32> = resent.iter().map(Packet::seq).collect();
    assert_eq!(seqs, vec![3, 4, 5, 6, 7, 8, 9]);

    p.ferry_all(resent);
    assert_eq!(p.r_env.delivered_bytes(), Pair::patterned(10));
    assert!(p.sender.is_idle());
    assert!(!p.s_env.timer_set);
}

#[test]
fn lost_ack_recovers_as_duplicate() {
    let mut p = Pair::default();
    p.sender.on_message(b"only one packet", &mut p.s_env);
    let pkts = p.s_env.drain();
    assert_eq!(pkts.len(), 1);

    // Receiver delivers and ACKs, but the ACK is lost.
    let lost_acks = p.to_receiver(&pkts[0]);
    assert_eq!(lost_acks[0].seq(), 0);
    assert_eq!(p.r_env.delivered.len(), 1);

    // Sender still thinks seq 0 is outstanding and retransmits on timeout.
    assert!(p.s_env.timer_set);
    p.sender.on_timeout(&mut p.s_env);
    let resent = p.s_env.drain();
    assert_eq!(resent.len(), 1);

    // The duplicate is not redelivered, but it is re-ACKed; this ACK gets
    // through and retires the packet.
    let acks = p.to_receiver(&resent[0]);
    assert_eq!(p.r_env.delivered.len(), 1);
    assert_eq!(acks[0].seq(), 0);

    p.sender.on_packet(&acks[0], &mut p.s_env);
    assert!(p.sender.is_idle());
    assert!(!p.s_env.timer_set);
}

#[test]
fn reordered_channel_buffers_and_drains() {
    let mut p = Pair::default();
    p.sender.on_message(&Pair::patterned(5), &mut p.s_env);
    let pkts = p.s_env.drain();

    // The channel permutes delivery to 2, 4, 1, 0, 3.
    let mut trace = Vec::new();
    for &i in &[2usize, 4, 1, 0, 3] {
        let acks = p.to_receiver(&pkts[i]);
        trace.push(acks[0].seq());
    }

    assert_eq!(trace, vec![u32::MAX, u32::MAX, u32::MAX, 2, 4]);
    assert_eq!(p.r_env.delivered_bytes(), Pair::patterned(5));
}

#[test]
fn corrupted_packet_is_silently_dropped() {
    let mut p = Pair::default();
    p.sender.on_message(&Pair::patterned(1), &mut p.s_env);
    let pkts = p.s_env.drain();

    // One bit flipped in the payload region while in transit.
    let mut raw = *pkts[0].as_bytes();
    raw[64] ^= 0x08;
    let mangled = Packet::from_bytes(raw);

    let acks = p.to_receiver(&mangled);
    assert!(acks.is_empty(), "a corrupt packet must not be ACKed");
    assert!(p.r_env.delivered.is_empty());

    // Recovery: the intact copy arrives after a timeout.
    p.sender.on_timeout(&mut p.s_env);
    let resent = p.s_env.drain();
    p.ferry_all(resent);
    assert_eq!(p.r_env.delivered_bytes(), Pair::patterned(1));
}

#[test]
fn full_window_backpressure() {
    let mut p = Pair::default();
    // 25 packets' worth while the channel returns no ACKs at all.
    p.sender.on_message(&Pair::patterned(25), &mut p.s_env);

    let first = p.s_env.drain();
    assert_eq!(first.len(), WINDOW_SIZE);
    assert_eq!(p.sender.in_flight(), WINDOW_SIZE);
    assert_eq!(p.sender.backlog_len(), 25 - WINDOW_SIZE);

    // ACKs delayed past the timeout: the same window goes out again, and
    // the count in flight never exceeds the bound.
    p.sender.on_timeout(&mut p.s_env);
    let second = p.s_env.drain();
    assert_eq!(second.len(), WINDOW_SIZE);
    assert_eq!(
        second.iter().map(Packet::seq).collect::<Vec<_>>(),
        first.iter().map(Packet::seq).collect::<Vec<_>>()
    );
    assert_eq!(p.sender.in_flight(), WINDOW_SIZE);

    // Once the stale ACKs finally arrive, the backlog flows.
    for value in 0..WINDOW_SIZE as u32 {
        p.sender.on_packet(&Packet::ack(value), &mut p.s_env);
    }
    assert_eq!(p.sender.in_flight(), WINDOW_SIZE);
    assert_eq!(p.sender.backlog_len(), 5);
}

#[test]
fn duplicated_packets_change_nothing() {
    let mut p = Pair::default();
    p.sender.on_message(&Pair::patterned(4), &mut p.s_env);
    let pkts = p.s_env.drain();

    // Every packet arrives twice, the second copy immediately after the
    // first.
    for pkt in &pkts {
        for copy in [pkt, pkt] {
            for ack in p.to_receiver(copy) {
                p.sender.on_packet(&ack, &mut p.s_env);
            }
        }
    }

    assert_eq!(p.r_env.delivered_bytes(), Pair::patterned(4));
    assert!(p.sender.is_idle());
    assert!(!p.s_env.timer_set);
}

#[test]
fn zero_length_message_is_admissible() {
    let mut p = Pair::default();
    p.sender.on_message(b"", &mut p.s_env);
    assert!(p.s_env.drain().is_empty());
    assert!(p.sender.is_idle());
    assert!(!p.s_env.timer_set);
}

#[test]
fn single_full_payload_is_one_packet() {
    let mut p = Pair::default();
    p.sender.on_message(&Pair::patterned(1), &mut p.s_env);
    let pkts = p.s_env.drain();
    assert_eq!(pkts.len(), 1);
    assert_eq!(pkts[0].payload_size(), MAX_PAYLOAD);
}

// ---------------------------------------------------------------------------
// Simulator-driven runs
// ---------------------------------------------------------------------------

#[test]
fn lossless_send_count_matches_segmentation() {
    // With a perfect channel the sender transmits exactly
    // ceil(total / MAX_PAYLOAD) data packets, never more.
    for total in [1usize, 118, 119, 120, 500, 2000] {
        let mut sim = Simulator::new(SimulatorConfig::default());
        let msg: Vec<u8> = (0..total).map(|i| (i % 253) as u8).collect();
        sim.submit_at(0.0, &msg);
        sim.run(1_000.0);

        assert!(sim.verify().is_ok(), "verify failed for {total} bytes");
        let expected = total.div_ceil(MAX_PAYLOAD) as u64;
        assert_eq!(
            sim.stats().data_sent,
            expected,
            "wrong send count for {total} bytes"
        );
    }
}

#[test]
fn adversarial_channel_still_delivers_exactly() {
    for seed in 0..8u64 {
        let mut sim = Simulator::new(SimulatorConfig {
            loss_rate: 0.15,
            corrupt_rate: 0.1,
            reorder_rate: 0.15,
            duplicate_rate: 0.1,
            seed,
            ..SimulatorConfig::default()
        });
        for i in 0..20 {
            let msg: Vec<u8> = (0..137 + 31 * i).map(|b| (b * 7 % 256) as u8).collect();
            sim.submit_at(i as f64 * 0.1, &msg);
        }
        sim.run(100_000.0);

        assert!(
            sim.verify().is_ok(),
            "stream mismatch with seed {seed}: {:?}",
            sim.verify()
        );
        assert_eq!(sim.delivered_bytes(), sim.submitted_bytes());
    }
}

#[test]
fn heavy_loss_is_eventually_masked() {
    let mut sim = Simulator::new(SimulatorConfig {
        loss_rate: 0.4,
        seed: 7,
        ..SimulatorConfig::default()
    });
    sim.submit_at(0.0, &vec![0xC3u8; 10 * MAX_PAYLOAD]);
    sim.run(100_000.0);

    assert!(sim.verify().is_ok());
    // Loss forces retransmission, so the channel saw more data packets than
    // the segment count.
    assert!(sim.stats().data_sent > 10);
    assert!(sim.stats().timeouts > 0);
}

#[test]
fn corruption_only_channel_delivers_exactly() {
    let mut sim = Simulator::new(SimulatorConfig {
        corrupt_rate: 0.3,
        seed: 21,
        ..SimulatorConfig::default()
    });
    let msg: Vec<u8> = (0..1000u32).map(|i| (i % 255) as u8).collect();
    sim.submit_at(0.0, &msg);
    sim.run(100_000.0);

    assert!(sim.verify().is_ok());
    assert_eq!(sim.delivered_bytes(), msg);
}
