//! The solve engine.
//!
//! One `Scheduler` plans exactly one batch: it is built from a cluster
//! snapshot, consumed by `solve`, and never reused. The loop pops a
//! workload, tries in-flight capacity, then the smallest proposed nodes,
//! then a fresh node per template in declared order; failures relax one
//! preference layer and re-enter the queue until nothing changes anymore.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use gantry_core::{InstanceType, NodeTemplate, Provisioner, Resources, Workload, labels};
use gantry_state::ClusterSnapshot;

use crate::error::{SchedulerError, SchedulerResult};
use crate::events::EventRecorder;
use crate::inflight::InFlightNode;
use crate::node::ProposedNode;
use crate::queue::Queue;
use crate::relax::Preferences;
use crate::topology::Topology;

pub struct Scheduler {
    templates: Vec<NodeTemplate>,
    /// Whole instance-type pool, sorted cheapest-first at construction.
    instance_types: Vec<Arc<InstanceType>>,
    daemon_overhead: BTreeMap<String, Resources>,
    /// Residual budget per provisioner that declared limits. Debited
    /// pessimistically: by in-flight capacity at construction and by the
    /// max viable capacity of each node added to the plan.
    remaining: BTreeMap<String, Resources>,
    inflight: Vec<InFlightNode>,
    nodes: Vec<ProposedNode>,
    topology: Topology,
    preferences: Preferences,
    recorder: Box<dyn EventRecorder>,
    sequence: usize,
}

impl Scheduler {
    pub fn new(
        templates: Vec<NodeTemplate>,
        provisioners: &[Provisioner],
        cluster: &ClusterSnapshot,
        topology: Topology,
        mut instance_types: Vec<Arc<InstanceType>>,
        daemon_overhead: BTreeMap<String, Resources>,
        recorder: Box<dyn EventRecorder>,
    ) -> Self {
        instance_types.sort_by(|a, b| {
            a.price
                .total_cmp(&b.price)
                .then_with(|| a.name.cmp(&b.name))
        });

        let mut remaining: BTreeMap<String, Resources> = provisioners
            .iter()
            .filter_map(|p| p.limits.clone().map(|l| (p.name.clone(), l)))
            .collect();

        let by_provisioner: BTreeMap<&str, &NodeTemplate> = templates
            .iter()
            .map(|t| (t.provisioner.as_str(), t))
            .collect();

        let mut inflight = Vec::new();
        cluster.for_each_node(|node| {
            // Nodes we did not launch are none of our business.
            let Some(owner) = node.labels.get(labels::PROVISIONER) else {
                return true;
            };
            let Some(template) = by_provisioner.get(owner.as_str()) else {
                debug!(node = %node.name, provisioner = %owner, "skipping node of unknown provisioner");
                return true;
            };
            let overhead = daemon_overhead
                .get(&template.name)
                .cloned()
                .unwrap_or_default();
            inflight.push(InFlightNode::new(node, &template.startup_taints, &overhead));

            // The status of a launched node is not trusted; recomputing the
            // residual from capacity keeps one consistent view per batch.
            if let Some(budget) = remaining.get_mut(owner) {
                *budget = debit(budget, &node.capacity);
            }
            true
        });

        Self {
            templates,
            instance_types,
            daemon_overhead,
            remaining,
            inflight,
            nodes: Vec::new(),
            topology,
            preferences: Preferences,
            recorder,
            sequence: 0,
        }
    }

    /// Plans the batch. Returns the proposed nodes; workloads that
    /// exhausted every option are reported through the recorder with the
    /// error from their final attempt. Cancellation is checked between
    /// queue iterations and carries the partial plan out.
    pub fn solve(
        mut self,
        cancel: &watch::Receiver<bool>,
        workloads: Vec<Workload>,
    ) -> SchedulerResult<Vec<ProposedNode>> {
        let mut errors: BTreeMap<String, SchedulerError> = BTreeMap::new();
        let mut queue = Queue::new(workloads);

        loop {
            if *cancel.borrow() {
                return Err(SchedulerError::Cancelled { partial: self.nodes });
            }
            let Some(mut workload) = queue.pop() else { break };

            match self.try_place(&workload) {
                Ok(()) => {
                    errors.remove(&workload.id);
                    continue;
                }
                Err(error) => {
                    errors.insert(workload.id.clone(), error);
                }
            }

            let relaxed = self.preferences.relax(&mut workload);
            if relaxed {
                self.topology.update(&workload);
            }
            queue.push(workload, relaxed);
        }

        self.report(queue.into_remaining(), &mut errors);
        Ok(self.nodes)
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn try_place(&mut self, workload: &Workload) -> SchedulerResult<()> {
        // In-flight capacity first, in construction order.
        for node in &mut self.inflight {
            if node.try_add(workload, &mut self.topology).is_ok() {
                return Ok(());
            }
        }

        // Then nodes already in the plan, densifying the smallest first.
        // Name is the secondary key so equal-sized nodes keep a total order.
        self.nodes.sort_by(|a, b| {
            a.workloads
                .len()
                .cmp(&b.workloads.len())
                .then_with(|| a.name.cmp(&b.name))
        });
        for node in &mut self.nodes {
            if node.add(workload, &mut self.topology).is_ok() {
                return Ok(());
            }
        }

        // Finally a fresh node, per template in declared order.
        let mut errors = Vec::new();
        for index in 0..self.templates.len() {
            let provisioner = self.templates[index].provisioner.clone();
            let viable = match self.remaining.get(&provisioner) {
                Some(budget) => filter_by_remaining_capacity(&self.instance_types, budget),
                None => self.instance_types.clone(),
            };
            if viable.is_empty() {
                errors.push(SchedulerError::LimitExceeded { provisioner });
                continue;
            }

            let overhead = self
                .daemon_overhead
                .get(&self.templates[index].name)
                .cloned()
                .unwrap_or_default();
            let mut node = ProposedNode::new(
                &self.templates[index],
                overhead,
                viable,
                self.sequence,
                &mut self.topology,
            );
            self.sequence += 1;

            match node.add(workload, &mut self.topology) {
                Ok(()) => {
                    // Track the worst case against the budget: any of the
                    // surviving instance types may end up being launched.
                    if let Some(budget) = self.remaining.get_mut(&provisioner) {
                        *budget = debit(budget, &max_resources(&node.viable));
                    }
                    debug!(
                        node = %node.name,
                        template = %node.template.name,
                        workload = %workload.id,
                        "created proposed node"
                    );
                    self.nodes.push(node);
                    return Ok(());
                }
                Err(error) => errors.push(error),
            }
        }
        Err(SchedulerError::Aggregate(errors))
    }

    fn report(&self, failed: Vec<Workload>, errors: &mut BTreeMap<String, SchedulerError>) {
        let existing: usize = self.inflight.iter().map(|n| n.workloads.len()).sum();
        let fresh: usize = self.nodes.iter().map(|n| n.workloads.len()).sum();
        if existing + fresh > 0 {
            info!(
                new_capacity = fresh,
                existing_capacity = existing,
                nodes = self.nodes.len(),
                "workloads planned against new and existing capacity"
            );
        }
        for node in &self.inflight {
            for workload in &node.workloads {
                self.recorder.workload_should_schedule(workload, &node.name);
            }
        }
        for workload in &failed {
            match errors.remove(&workload.id) {
                Some(error) => self.recorder.workload_failed_to_schedule(workload, &error),
                None => warn!(workload = %workload.id, "workload left the queue without an error"),
            }
        }
    }
}

/// Keeps the instance types whose full capacity still fits inside the
/// remaining budget on every limited resource.
fn filter_by_remaining_capacity(
    instance_types: &[Arc<InstanceType>],
    remaining: &Resources,
) -> Vec<Arc<InstanceType>> {
    instance_types
        .iter()
        .filter(|it| {
            remaining
                .iter()
                .all(|(resource, budget)| it.resources.get(resource) <= budget)
        })
        .cloned()
        .collect()
}

/// Element-wise maximum capacity over a set of instance types.
fn max_resources(instance_types: &[Arc<InstanceType>]) -> Resources {
    let mut max = Resources::new();
    for it in instance_types {
        max = max.max(&it.resources);
    }
    max
}

/// Subtracts usage from a budget on the budget's own resources only: a
/// provisioner limits exactly the resources it declares.
fn debit(budget: &Resources, usage: &Resources) -> Resources {
    budget
        .iter()
        .map(|(name, quantity)| (name.to_string(), quantity - usage.get(name)))
        .collect()
}
