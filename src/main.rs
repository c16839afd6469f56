//! Entry point for `reliable-transfer`.
//!
//! Parses CLI arguments, builds a random workload, runs it through the
//! simulated lossy channel, and verifies that every submitted byte came out
//! the other side in order.  All actual protocol work is delegated to
//! library modules; `main.rs` owns only process setup and reporting.

use anyhow::Result;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use reliable_transfer::simulator::{Simulator, SimulatorConfig};

/// Reliable data transfer exercised over a simulated lossy channel.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Number of messages the upper layer submits.
    #[arg(long, default_value_t = 100)]
    messages: usize,

    /// Largest message size in bytes; sizes are drawn uniformly from 1..=max.
    #[arg(long, default_value_t = 600)]
    max_size: usize,

    /// Probability that the channel drops a packet.
    #[arg(long, default_value_t = 0.1)]
    loss: f64,

    /// Probability that the channel flips one bit of a packet.
    #[arg(long, default_value_t = 0.05)]
    corrupt: f64,

    /// Probability that the channel delays a packet past its successors.
    #[arg(long, default_value_t = 0.1)]
    reorder: f64,

    /// Probability that the channel delivers a packet twice.
    #[arg(long, default_value_t = 0.05)]
    duplicate: f64,

    /// One-way channel latency in simulated seconds.
    #[arg(long, default_value_t = 0.1)]
    latency: f64,

    /// Seed for both the workload and the channel fault pattern.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Simulated-time budget for the run, in seconds.
    #[arg(long, default_value_t = 10_000.0)]
    deadline: f64,
}

fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let mut sim = Simulator::new(SimulatorConfig {
        loss_rate: cli.loss,
        corrupt_rate: cli.corrupt,
        reorder_rate: cli.reorder,
        duplicate_rate: cli.duplicate,
        latency: cli.latency,
        seed: cli.seed,
        ..SimulatorConfig::default()
    });

    // The workload draws from its own seeded RNG so a run is reproducible
    // from the command line alone.
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let mut at = 0.0;
    let mut total = 0usize;
    for _ in 0..cli.messages {
        let size = rng.random_range(1..=cli.max_size.max(1));
        let msg: Vec<u8> = (0..size).map(|_| rng.random()).collect();
        total += size;
        sim.submit_at(at, &msg);
        at += rng.random_range(0.0..0.2);
    }
    log::info!("workload: {} message(s), {} byte(s)", cli.messages, total);

    sim.run(cli.deadline);
    sim.verify()?;

    let stats = sim.stats();
    println!("transfer complete at t={:.2}s", sim.now());
    println!("  submitted   {} message(s), {} byte(s)", cli.messages, total);
    println!(
        "  delivered   {} message(s), {} byte(s)",
        stats.delivered_msgs, stats.delivered_bytes
    );
    println!(
        "  channel     {} data + {} ACK packet(s); {} lost, {} corrupted, {} reordered, {} duplicated",
        stats.data_sent, stats.acks_sent, stats.lost, stats.corrupted, stats.reordered, stats.duplicated
    );
    println!("  recovery    {} retransmission timeout(s)", stats.timeouts);
    Ok(())
}
