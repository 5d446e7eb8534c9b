//! gantry-state — cluster snapshot views and host-port reservations.
//!
//! The scheduler never talks to the reconciler directly; it consumes a
//! `ClusterSnapshot` captured before a batch begins and treats it as
//! read-only. This crate also owns the `HostPortReservation` ledger that
//! both real and proposed nodes use to keep `(ip, port, protocol)` claims
//! unique per node.

pub mod error;
pub mod host_ports;
pub mod node;

pub use error::{StateError, StateResult};
pub use host_ports::HostPortReservation;
pub use node::{ClusterSnapshot, Node};
