//! `reliable-transfer` - in-order, gap-free delivery over a lossy packet channel.
//!
//! The channel underneath may drop, corrupt, reorder, and duplicate fixed-size
//! packets.  On top of it, a sliding-window sender and a reorder-buffer
//! receiver recover an exact byte stream using cumulative acknowledgements,
//! a CRC-32 integrity check, and a single retransmission timer.
//!
//! # Architecture
//!
//! ```text
//!  upper layer                                       upper layer
//!      │ messages                            messages ▲
//!      ▼                                              │
//!  ┌──────────┐    DATA packets    ┌──────────────────┴─┐
//!  │  Sender  │───────────────────▶│      Receiver      │
//!  └────┬─────┘                    └─────────┬──────────┘
//!       │         cumulative ACKs            │
//!       │◀───────────────────────────────────┘
//!       │
//!  ┌────▼──────────────────────────────────────────────┐
//!  │                 lossy channel                     │
//!  │   (drop / corrupt / reorder / duplicate faults)   │
//!  └───────────────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]    - fixed-size wire frame and checksum codec
//! - [`harness`]   - environment traits the state machines are driven through
//! - [`sender`]    - sliding-window send-side state machine
//! - [`receiver`]  - reorder-buffer receive-side state machine
//! - [`simulator`] - discrete-event channel simulation for tests and the CLI
//!
//! The state machines are purely event-driven: the environment invokes
//! `on_message` / `on_packet` / `on_timeout` callbacks which run to
//! completion, and all outbound effects flow through the [`harness`] traits.

pub mod harness;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;

/// Maximum number of unacknowledged packets the sender keeps in flight.
///
/// Both endpoints size their ring buffers with this constant, so it must be
/// identical on both sides.
pub const WINDOW_SIZE: usize = 10;

/// Retransmission timeout in simulated seconds.
///
/// The sender rearms its one-shot timer to this interval whenever cumulative
/// progress is made, and goes back to the ACK frontier when it fires.
pub const RETRANSMIT_TIMEOUT: f64 = 0.3;
