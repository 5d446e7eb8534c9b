//! Per-node host-port reservation ledger.
//!
//! Each `(host IP, port, protocol)` triple on a node must be unique across
//! the workloads bound to it. Requests that leave the IP unset claim the
//! unspecified address, which collides with every concrete IP on the same
//! port and protocol (and vice versa), for both `0.0.0.0` and `::`.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use gantry_core::{Protocol, Workload};

use crate::error::{StateError, StateResult};

#[derive(Debug, PartialEq, Eq)]
struct Entry {
    workload: String,
    ip: IpAddr,
    port: u16,
    protocol: Protocol,
}

impl Entry {
    fn matches(&self, rhs: &Entry) -> bool {
        if self.protocol != rhs.protocol || self.port != rhs.port {
            return false;
        }
        self.ip == rhs.ip || self.ip.is_unspecified() || rhs.ip.is_unspecified()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "workload={} ip={} port={} proto={}",
            self.workload, self.ip, self.port, self.protocol
        )
    }
}

/// Ledger of reserved host ports for one node.
///
/// Entries are immutable once appended, so `clone()` yields an independent
/// ledger that shares the underlying records — the cheap copy the
/// clone-then-commit admission discipline relies on.
#[derive(Debug, Clone, Default)]
pub struct HostPortReservation {
    reserved: Vec<Arc<Entry>>,
}

impl HostPortReservation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves every host port the workload requests, or fails on the
    /// first conflict with an existing reservation.
    pub fn add(&mut self, workload: &Workload) -> StateResult<()> {
        let new_entries = requested_ports(workload);
        for entry in &new_entries {
            for existing in &self.reserved {
                if entry.matches(existing) {
                    return Err(StateError::HostPortConflict {
                        new: entry.to_string(),
                        existing: existing.to_string(),
                    });
                }
            }
        }
        self.reserved.extend(new_entries.into_iter().map(Arc::new));
        Ok(())
    }

    /// Drops every reservation made by the named workload.
    pub fn delete_workload(&mut self, id: &str) {
        self.reserved.retain(|e| e.workload != id);
    }

    pub fn len(&self) -> usize {
        self.reserved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reserved.is_empty()
    }
}

fn requested_ports(workload: &Workload) -> Vec<Entry> {
    workload
        .host_ports
        .iter()
        .map(|request| Entry {
            workload: workload.id.clone(),
            ip: request
                .ip
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            port: request.port,
            protocol: request.protocol.unwrap_or_default(),
        })
        .collect()
}
