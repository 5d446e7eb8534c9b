//! In-flight node views.
//!
//! An in-flight node is real — launched by a previous batch but not yet
//! ready. Its shape is fixed, so admission is a sequence of checks against
//! concrete labels and remaining capacity rather than a narrowing of
//! possibilities. Filling these first keeps the planner from launching
//! capacity it already paid for.

use std::collections::BTreeMap;

use tracing::warn;

use gantry_core::{RequirementSet, Resources, Taint, Workload};
use gantry_state::{HostPortReservation, Node};

use crate::error::{SchedulerError, SchedulerResult};
use crate::topology::Topology;

/// Read-mostly view of a launched but not-yet-ready node.
#[derive(Debug)]
pub struct InFlightNode {
    pub name: String,
    labels: BTreeMap<String, String>,
    /// Node taints minus the template's startup taints, which everything
    /// the planner places is implicitly exempt from.
    taints: Vec<Taint>,
    requirements: RequirementSet,
    available: Resources,
    ports: HostPortReservation,
    /// Workloads admitted in this batch.
    pub workloads: Vec<Workload>,
}

impl InFlightNode {
    pub fn new(node: &Node, startup_taints: &[Taint], daemon_overhead: &Resources) -> Self {
        let taints = node
            .taints
            .iter()
            .filter(|t| !startup_taints.contains(t))
            .cloned()
            .collect();

        let mut ports = HostPortReservation::new();
        for bound in &node.bound {
            if let Err(error) = ports.add(bound) {
                // A conflict among already-bound workloads means the cluster
                // state is damaged; keep the first claim and plan around it.
                warn!(node = %node.name, %error, "bound workloads conflict on host ports");
            }
        }

        Self {
            name: node.name.clone(),
            requirements: RequirementSet::from_labels(&node.labels),
            labels: node.labels.clone(),
            taints,
            available: node
                .capacity
                .subtract(&node.allocated())
                .subtract(daemon_overhead),
            ports,
            workloads: Vec::new(),
        }
    }

    /// Attempts to place the workload here. All checks run against clones
    /// or pure values; state is only touched once every check has passed.
    pub fn try_add(&mut self, workload: &Workload, topology: &mut Topology) -> SchedulerResult<()> {
        let workload_req = workload.hard_requirements();
        if let Err(key) = workload_req.satisfied_by(&self.labels) {
            return Err(SchedulerError::RequirementConflict {
                key: key.to_string(),
            });
        }

        for taint in &self.taints {
            if taint.effect.blocks_scheduling() && !workload.tolerates(taint) {
                return Err(SchedulerError::TaintIntolerance {
                    key: taint.key.clone(),
                    value: taint.value.clone(),
                    effect: taint.effect,
                });
            }
        }

        let mut ports = self.ports.clone();
        ports.add(workload)?;

        if !workload.demands.fits(&self.available) {
            return Err(SchedulerError::ResourceOverflow {
                demands: workload.demands.clone(),
            });
        }

        // Topology goes last; its counters are written on commit only and
        // never rolled back.
        let topo_req = topology.requirements_for(workload, &self.requirements)?;
        if let Err(key) = topo_req.satisfied_by(&self.labels) {
            return Err(SchedulerError::TopologyViolation {
                key: key.to_string(),
            });
        }

        self.ports = ports;
        self.available = self.available.subtract(&workload.demands);
        self.workloads.push(workload.clone());
        topology.record_labels(workload, &self.labels);
        Ok(())
    }
}
