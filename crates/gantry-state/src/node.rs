//! Read-only cluster node views.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use gantry_core::{Resources, Taint, Workload};

/// A point-in-time view of a real cluster node: its labels, taints, total
/// capacity and the workloads already bound to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub taints: Vec<Taint>,
    pub capacity: Resources,
    pub bound: Vec<Workload>,
}

impl Node {
    /// Sum of the demands of everything already bound here.
    pub fn allocated(&self) -> Resources {
        let mut total = Resources::new();
        for workload in &self.bound {
            total.add_assign(&workload.demands);
        }
        total
    }
}

/// A captured set of cluster nodes, safe to iterate for the duration of one
/// batch. The reconciler that produced it may keep evolving its own copy;
/// this one never changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    nodes: Vec<Node>,
}

impl ClusterSnapshot {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Visits every node in snapshot order. The visitor returns `false` to
    /// stop early. Callers must not retain the yielded reference beyond the
    /// traversal.
    pub fn for_each_node<F>(&self, mut visit: F)
    where
        F: FnMut(&Node) -> bool,
    {
        for node in &self.nodes {
            if !visit(node) {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, cpu: i64) -> Node {
        Node {
            name: name.to_string(),
            capacity: Resources::new().with("cpu", cpu),
            ..Node::default()
        }
    }

    #[test]
    fn allocated_sums_bound_demands() {
        let mut n = node("n1", 4000);
        n.bound = vec![
            Workload {
                id: "a".to_string(),
                demands: Resources::new().with("cpu", 500),
                ..Workload::default()
            },
            Workload {
                id: "b".to_string(),
                demands: Resources::new().with("cpu", 250).with("memory", 1024),
                ..Workload::default()
            },
        ];

        let allocated = n.allocated();
        assert_eq!(allocated.get("cpu"), 750);
        assert_eq!(allocated.get("memory"), 1024);
    }

    #[test]
    fn traversal_preserves_order_and_stops_early() {
        let snapshot = ClusterSnapshot::new(vec![node("n1", 1), node("n2", 1), node("n3", 1)]);

        let mut seen = Vec::new();
        snapshot.for_each_node(|n| {
            seen.push(n.name.clone());
            seen.len() < 2
        });
        assert_eq!(seen, vec!["n1", "n2"]);
    }
}
