//! The workload model.
//!
//! A `Workload` is one schedulable unit: resource demands, the label
//! requirements that bind it to node shapes, topology rules relating it to
//! other workloads, taint tolerations and host-port requests. Preferred
//! (soft) constraints live in their own fields because the preference
//! relaxer strips them layer by layer when placement keeps failing.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::requirements::{Operator, RequirementSet};
use crate::resources::Resources;
use crate::taints::{Taint, Toleration};

/// Transport protocol of a host-port request. Defaults to TCP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Sctp => write!(f, "SCTP"),
        }
    }
}

/// A request to bind a port on the host the workload lands on.
/// `ip: None` means the unspecified address (all interfaces).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPortRequest {
    pub ip: Option<IpAddr>,
    pub port: u16,
    pub protocol: Option<Protocol>,
}

/// One node-selector clause: `key op values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRequirement {
    pub key: String,
    pub operator: Operator,
    pub values: Vec<String>,
}

/// A pod-affinity or pod-anti-affinity term: workloads matching `selector`
/// attract (or repel) within the topology domain named by `topology_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffinityTerm {
    pub topology_key: String,
    pub selector: BTreeMap<String, String>,
}

/// How a topology-spread rule reacts when its skew bound cannot be met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhenUnsatisfiable {
    DoNotSchedule,
    ScheduleAnyway,
}

/// An even-spread rule over the domains of `topology_key`, counting
/// workloads that match `selector`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadConstraint {
    pub topology_key: String,
    pub max_skew: u32,
    pub when_unsatisfiable: WhenUnsatisfiable,
    pub selector: BTreeMap<String, String>,
}

/// A pending unit of work to be placed on a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    /// Stable identity, e.g. "namespace/name". Used in diagnostics and the
    /// host-port ledger.
    pub id: String,
    pub labels: BTreeMap<String, String>,
    pub demands: Resources,

    /// Exact-match node selector (each entry is an `In` clause).
    pub node_selector: BTreeMap<String, String>,
    /// Hard node-affinity clauses.
    pub required_affinity: Vec<NodeRequirement>,
    /// Preferred node-affinity clauses. Binding until the relaxer drops them.
    pub preferred_affinity: Vec<NodeRequirement>,

    pub pod_affinity: Vec<AffinityTerm>,
    pub preferred_pod_affinity: Vec<AffinityTerm>,
    pub pod_anti_affinity: Vec<AffinityTerm>,
    pub preferred_pod_anti_affinity: Vec<AffinityTerm>,

    pub spread_constraints: Vec<SpreadConstraint>,
    pub tolerations: Vec<Toleration>,
    pub host_ports: Vec<HostPortRequest>,
}

impl Workload {
    /// The requirement set a node must satisfy to host this workload.
    ///
    /// Preferred node-affinity clauses are folded in as long as they are
    /// present: preferences bind until relaxation strips them, which is
    /// what gives the relaxer something to trade away.
    pub fn hard_requirements(&self) -> RequirementSet {
        let mut req = RequirementSet::new();
        for (key, value) in &self.node_selector {
            req.add(key, Operator::In, [value.clone()]);
        }
        for clause in self.required_affinity.iter().chain(&self.preferred_affinity) {
            req.add(&clause.key, clause.operator, clause.values.iter().cloned());
        }
        req
    }

    pub fn tolerates(&self, taint: &Taint) -> bool {
        self.tolerations.iter().any(|t| t.tolerates(taint))
    }
}

/// Exact-match label selector: every entry must be present in `labels`.
/// An empty selector matches nothing by design (a spread or affinity rule
/// with no selector would otherwise count every workload in the cluster).
pub fn selector_matches(
    selector: &BTreeMap<String, String>,
    labels: &BTreeMap<String, String>,
) -> bool {
    !selector.is_empty()
        && selector
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|lv| lv == v))
}
