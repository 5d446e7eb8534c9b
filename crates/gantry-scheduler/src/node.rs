//! Proposed nodes.
//!
//! A proposed node is capacity the planner intends to launch. It starts
//! out as the whole template-compatible instance-type pool and narrows
//! with every admission: the requirement set tightens, incompatible or
//! too-small instance types drop out, host ports get claimed. Whatever
//! survives when the batch ends is handed to the launch path, which picks
//! the cheapest remaining type.

use std::sync::Arc;

use tracing::debug;

use gantry_core::{InstanceType, NodeTemplate, Operator, RequirementSet, Resources, Workload, labels};
use gantry_state::HostPortReservation;

use crate::error::{SchedulerError, SchedulerResult};
use crate::topology::Topology;

#[derive(Debug, Clone)]
pub struct ProposedNode {
    /// Generated hostname; doubles as the node's hostname topology domain.
    pub name: String,
    pub template: NodeTemplate,
    pub requirements: RequirementSet,
    /// Instance types that can still back this node, cheapest first.
    pub viable: Vec<Arc<InstanceType>>,
    /// Admitted workloads in admission order.
    pub workloads: Vec<Workload>,
    demands: Resources,
    daemon_overhead: Resources,
    ports: HostPortReservation,
}

impl ProposedNode {
    pub fn new(
        template: &NodeTemplate,
        daemon_overhead: Resources,
        viable: Vec<Arc<InstanceType>>,
        sequence: usize,
        topology: &mut Topology,
    ) -> Self {
        let name = format!("{}-{}", template.name, sequence);
        let mut requirements = template.requirements.clone();
        requirements.add(labels::HOSTNAME, Operator::In, [name.clone()]);
        topology.register_domain(labels::HOSTNAME, &name);

        Self {
            name,
            template: template.clone(),
            requirements,
            viable,
            workloads: Vec::new(),
            demands: Resources::new(),
            daemon_overhead,
            ports: HostPortReservation::new(),
        }
    }

    /// Attempts to admit the workload, tightening the node on success.
    ///
    /// The viable set and requirement set are computed aside and assigned
    /// only after every check passes, so a failed admission leaves the
    /// node exactly as it was.
    pub fn add(&mut self, workload: &Workload, topology: &mut Topology) -> SchedulerResult<()> {
        // Template taints bind future nodes too; startup taints do not.
        for taint in &self.template.taints {
            if taint.effect.blocks_scheduling() && !workload.tolerates(taint) {
                return Err(SchedulerError::TaintIntolerance {
                    key: taint.key.clone(),
                    value: taint.value.clone(),
                    effect: taint.effect,
                });
            }
        }

        let workload_req = workload.hard_requirements();
        // A requirement on a label neither the template nor the instance
        // type will ever put on this node is unsatisfiable.
        for (key, clause) in workload_req.iter() {
            if clause.requires_presence()
                && !self.requirements.has(key)
                && !labels::instance_provided(key)
            {
                return Err(SchedulerError::RequirementConflict {
                    key: key.to_string(),
                });
            }
        }

        let candidate = self.requirements.intersect(&workload_req);
        if let Some(key) = candidate.conflict() {
            return Err(SchedulerError::RequirementConflict {
                key: key.to_string(),
            });
        }

        let candidate = candidate.intersect(&topology.requirements_for(workload, &candidate)?);
        if let Some(key) = candidate.conflict() {
            return Err(SchedulerError::TopologyViolation {
                key: key.to_string(),
            });
        }

        let total = self
            .demands
            .add(&workload.demands)
            .add(&self.daemon_overhead);
        let compatible: Vec<Arc<InstanceType>> = self
            .viable
            .iter()
            .filter(|it| it.compatible_with(&candidate))
            .cloned()
            .collect();
        if compatible.is_empty() {
            return Err(SchedulerError::RequirementConflict {
                key: labels::INSTANCE_TYPE.to_string(),
            });
        }
        let fitting: Vec<Arc<InstanceType>> = compatible
            .into_iter()
            .filter(|it| total.fits(&it.resources))
            .collect();
        if fitting.is_empty() {
            return Err(SchedulerError::ResourceOverflow { demands: total });
        }

        let mut ports = self.ports.clone();
        ports.add(workload)?;

        debug!(
            node = %self.name,
            workload = %workload.id,
            viable = fitting.len(),
            "admitted workload to proposed node"
        );
        self.viable = fitting;
        self.requirements = candidate;
        self.demands.add_assign(&workload.demands);
        self.ports = ports;
        self.workloads.push(workload.clone());
        topology.record(workload, &self.requirements);
        Ok(())
    }

    /// The launch choice: the cheapest instance type that survived.
    pub fn cheapest(&self) -> Option<&Arc<InstanceType>> {
        self.viable.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{HostPortRequest, NodeRequirement, Offering, Taint, TaintEffect, Toleration};
    use std::collections::BTreeMap;

    fn instance(name: &str, price: f64, cpu: i64, zones: &[&str]) -> Arc<InstanceType> {
        Arc::new(InstanceType {
            name: name.to_string(),
            price,
            resources: Resources::new().with("cpu", cpu).with("memory", 64 << 30),
            architecture: "amd64".to_string(),
            os: "linux".to_string(),
            offerings: zones
                .iter()
                .map(|z| Offering {
                    zone: z.to_string(),
                    capacity_type: "on-demand".to_string(),
                    price,
                    available: true,
                })
                .collect(),
        })
    }

    fn template() -> NodeTemplate {
        NodeTemplate {
            name: "default".to_string(),
            provisioner: "default".to_string(),
            requirements: RequirementSet::new().with(
                labels::ZONE,
                Operator::In,
                ["z1", "z2"],
            ),
            taints: Vec::new(),
            startup_taints: Vec::new(),
        }
    }

    fn pool() -> Vec<Arc<InstanceType>> {
        vec![
            instance("small", 1.0, 2000, &["z1", "z2"]),
            instance("medium", 2.0, 4000, &["z1", "z2"]),
            instance("large", 4.0, 8000, &["z1", "z2"]),
        ]
    }

    fn workload(id: &str, cpu: i64) -> Workload {
        Workload {
            id: id.to_string(),
            demands: Resources::new().with("cpu", cpu),
            ..Workload::default()
        }
    }

    #[test]
    fn admission_narrows_viable_set_but_keeps_order() {
        let mut topology = Topology::default();
        let mut node = ProposedNode::new(&template(), Resources::new(), pool(), 0, &mut topology);

        node.add(&workload("a", 1000), &mut topology).unwrap();
        assert_eq!(node.viable.len(), 3);
        assert_eq!(node.cheapest().unwrap().name, "small");

        node.add(&workload("b", 2500), &mut topology).unwrap();
        // 3500m no longer fits the small type.
        let names: Vec<&str> = node.viable.iter().map(|it| it.name.as_str()).collect();
        assert_eq!(names, vec!["medium", "large"]);
        assert_eq!(node.cheapest().unwrap().name, "medium");
    }

    #[test]
    fn overflow_when_nothing_fits() {
        let mut topology = Topology::default();
        let mut node = ProposedNode::new(&template(), Resources::new(), pool(), 0, &mut topology);

        let err = node.add(&workload("a", 9000), &mut topology).unwrap_err();
        assert!(matches!(err, SchedulerError::ResourceOverflow { .. }));
        assert!(node.workloads.is_empty());
        assert_eq!(node.viable.len(), 3, "failed add must not shrink the pool");
    }

    #[test]
    fn daemon_overhead_counts_against_capacity() {
        let mut topology = Topology::default();
        let overhead = Resources::new().with("cpu", 1500);
        let mut node = ProposedNode::new(
            &template(),
            overhead,
            vec![instance("small", 1.0, 2000, &["z1"])],
            0,
            &mut topology,
        );

        assert!(node.add(&workload("a", 1000), &mut topology).is_err());
        assert!(node.add(&workload("b", 500), &mut topology).is_ok());
    }

    #[test]
    fn requirement_on_unknowable_label_is_rejected() {
        let mut topology = Topology::default();
        let mut node = ProposedNode::new(&template(), Resources::new(), pool(), 0, &mut topology);

        let mut picky = workload("a", 100);
        picky.preferred_affinity = vec![NodeRequirement {
            key: "nonexistent".to_string(),
            operator: Operator::In,
            values: vec!["true".to_string()],
        }];
        let err = node.add(&picky, &mut topology).unwrap_err();
        assert!(matches!(err, SchedulerError::RequirementConflict { key } if key == "nonexistent"));
    }

    #[test]
    fn zone_pinning_filters_offerings() {
        let mut topology = Topology::default();
        let pool = vec![
            instance("z1-only", 1.0, 4000, &["z1"]),
            instance("z2-only", 2.0, 4000, &["z2"]),
        ];
        let mut node = ProposedNode::new(&template(), Resources::new(), pool, 0, &mut topology);

        let mut pinned = workload("a", 100);
        pinned.node_selector =
            BTreeMap::from([(labels::ZONE.to_string(), "z2".to_string())]);
        node.add(&pinned, &mut topology).unwrap();

        assert_eq!(node.viable.len(), 1);
        assert_eq!(node.viable[0].name, "z2-only");
        assert_eq!(node.requirements.any(labels::ZONE), Some("z2"));
    }

    #[test]
    fn template_taints_block_intolerant_workloads() {
        let mut topology = Topology::default();
        let mut tpl = template();
        tpl.taints = vec![Taint {
            key: "dedicated".to_string(),
            value: "batch".to_string(),
            effect: TaintEffect::NoSchedule,
        }];
        let mut node = ProposedNode::new(&tpl, Resources::new(), pool(), 0, &mut topology);

        let err = node.add(&workload("a", 100), &mut topology).unwrap_err();
        assert!(matches!(err, SchedulerError::TaintIntolerance { .. }));

        let mut tolerant = workload("b", 100);
        tolerant.tolerations = vec![Toleration::default()];
        assert!(node.add(&tolerant, &mut topology).is_ok());
    }

    #[test]
    fn startup_taints_do_not_block() {
        let mut topology = Topology::default();
        let mut tpl = template();
        tpl.startup_taints = vec![Taint {
            key: "gantry.dev/not-ready".to_string(),
            value: "true".to_string(),
            effect: TaintEffect::NoSchedule,
        }];
        let mut node = ProposedNode::new(&tpl, Resources::new(), pool(), 0, &mut topology);
        assert!(node.add(&workload("a", 100), &mut topology).is_ok());
    }

    #[test]
    fn host_port_conflict_rolls_back() {
        let mut topology = Topology::default();
        let mut node = ProposedNode::new(&template(), Resources::new(), pool(), 0, &mut topology);

        let mut first = workload("a", 100);
        first.host_ports = vec![HostPortRequest {
            ip: None,
            port: 8080,
            protocol: None,
        }];
        node.add(&first, &mut topology).unwrap();

        let mut second = workload("b", 100);
        second.host_ports = first.host_ports.clone();
        let viable_before = node.viable.len();
        let err = node.add(&second, &mut topology).unwrap_err();
        assert!(matches!(err, SchedulerError::HostPort(_)));
        assert_eq!(node.workloads.len(), 1);
        assert_eq!(node.viable.len(), viable_before);
    }

    #[test]
    fn each_node_gets_a_distinct_hostname_domain() {
        let mut topology = Topology::default();
        let n0 = ProposedNode::new(&template(), Resources::new(), pool(), 0, &mut topology);
        let n1 = ProposedNode::new(&template(), Resources::new(), pool(), 1, &mut topology);
        assert_ne!(n0.name, n1.name);
        assert_eq!(n0.requirements.any(labels::HOSTNAME), Some(n0.name.as_str()));
    }
}
