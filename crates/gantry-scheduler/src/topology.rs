//! Topology bookkeeping across a batch.
//!
//! Spread, pod-affinity and pod-anti-affinity rules all reduce to the same
//! shape: a counter per topology domain (zone, hostname, ...) scoped to a
//! label selector, updated as workloads are tentatively placed. Admission
//! queries answer "which domain values may this workload still land in?"
//! and come back as a `RequirementSet` the target node must satisfy, so
//! the proposed-node admission path can fold them in with one intersect.
//!
//! Counts include workloads already bound in the cluster snapshot plus
//! everything tentatively placed in this batch.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::warn;

use gantry_core::{
    InstanceType, NodeTemplate, Operator, RequirementSet, WhenUnsatisfiable, Workload, labels,
    selector_matches,
};
use gantry_state::ClusterSnapshot;

use crate::error::{SchedulerError, SchedulerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    Spread,
    Affinity,
    AntiAffinity,
}

#[derive(Debug)]
struct TopologyGroup {
    kind: GroupKind,
    topology_key: String,
    selector: BTreeMap<String, String>,
    /// Spread groups only; zero for the affinity kinds.
    max_skew: u32,
    counts: BTreeMap<String, u32>,
}

impl TopologyGroup {
    fn count(&self, domain: &str) -> u32 {
        self.counts.get(domain).copied().unwrap_or(0)
    }
}

/// Domain counters for every spread/affinity rule active in a batch.
///
/// Groups are created lazily on first reference and identified by
/// `(kind, topology key, selector, max skew)`, so a spread rule downgraded
/// to schedule-anyway keeps its history — hardness is the rule's property,
/// not the group's.
#[derive(Debug, Default)]
pub struct Topology {
    groups: Vec<TopologyGroup>,
    /// Known domain values per topology key.
    domains: BTreeMap<String, BTreeSet<String>>,
    /// What each recorded workload contributed: (group index, domain).
    contributions: BTreeMap<String, Vec<(usize, String)>>,
}

impl Topology {
    /// Builds the batch topology: gathers the domain universe from cluster
    /// labels, template requirements and instance-type offerings, registers
    /// a group for every rule in the batch, then counts the workloads
    /// already bound in the snapshot.
    pub fn new(
        cluster: &ClusterSnapshot,
        templates: &[NodeTemplate],
        instance_types: &[Arc<InstanceType>],
        workloads: &[Workload],
    ) -> Self {
        let mut topology = Self::default();

        cluster.for_each_node(|node| {
            for (key, value) in &node.labels {
                topology.register_domain(key, value);
            }
            true
        });
        for template in templates {
            for key in template.requirements.keys().collect::<Vec<_>>() {
                if let Some(values) = template.requirements.values(key) {
                    for value in values.clone() {
                        topology.register_domain(key, &value);
                    }
                }
            }
        }
        for instance_type in instance_types {
            for offering in &instance_type.offerings {
                topology.register_domain(labels::ZONE, &offering.zone);
                topology.register_domain(labels::CAPACITY_TYPE, &offering.capacity_type);
            }
        }

        for workload in workloads {
            topology.register(workload);
        }

        cluster.for_each_node(|node| {
            for bound in node.bound.clone() {
                topology.record_labels(&bound, &node.labels);
            }
            true
        });

        topology
    }

    /// Makes a domain value known under a topology key. Proposed nodes call
    /// this with their generated hostname.
    pub fn register_domain(&mut self, key: &str, value: &str) {
        self.domains
            .entry(key.to_string())
            .or_default()
            .insert(value.to_string());
    }

    /// The additional requirements a node must satisfy to admit `workload`,
    /// given the node's current requirement set. Fails with
    /// `TopologyViolation` when some rule has no admissible domain left.
    pub fn requirements_for(
        &mut self,
        workload: &Workload,
        node_req: &RequirementSet,
    ) -> SchedulerResult<RequirementSet> {
        self.register(workload);
        let mut combined = RequirementSet::new();

        for rule in &workload.spread_constraints {
            if rule.when_unsatisfiable != WhenUnsatisfiable::DoNotSchedule {
                continue;
            }
            let group = self.group_index(
                GroupKind::Spread,
                &rule.topology_key,
                &rule.selector,
                rule.max_skew,
            );
            let universe = self.domain_universe(&rule.topology_key);
            let group = &self.groups[group];
            let min = universe.iter().map(|d| group.count(d)).min().unwrap_or(0);
            // A domain stays admissible while one more placement keeps the
            // skew within bounds; among those, the least-loaded domain is
            // chosen so the recorded count stays meaningful.
            let pick = universe
                .iter()
                .filter(|d| group.count(d) + 1 - min <= rule.max_skew)
                .filter(|d| node_req.admits(&rule.topology_key, d))
                .min_by_key(|d| group.count(d));
            match pick {
                Some(domain) => {
                    combined.add(&rule.topology_key, Operator::In, [domain.clone()]);
                }
                None => {
                    return Err(SchedulerError::TopologyViolation {
                        key: rule.topology_key.clone(),
                    });
                }
            }
        }

        for rule in workload
            .pod_affinity
            .iter()
            .chain(&workload.preferred_pod_affinity)
        {
            let group = self.group_index(GroupKind::Affinity, &rule.topology_key, &rule.selector, 0);
            let group = &self.groups[group];
            let occupied: BTreeSet<String> = group
                .counts
                .iter()
                .filter(|(domain, count)| {
                    **count > 0 && node_req.admits(&rule.topology_key, domain)
                })
                .map(|(domain, _)| domain.clone())
                .collect();
            if occupied.is_empty() {
                // Nothing to co-locate with yet. A workload matching its own
                // affinity selector may seed the domain anywhere admissible.
                if selector_matches(&rule.selector, &workload.labels) {
                    continue;
                }
                return Err(SchedulerError::TopologyViolation {
                    key: rule.topology_key.clone(),
                });
            }
            combined.add(&rule.topology_key, Operator::In, occupied);
        }

        for rule in workload
            .pod_anti_affinity
            .iter()
            .chain(&workload.preferred_pod_anti_affinity)
        {
            let group =
                self.group_index(GroupKind::AntiAffinity, &rule.topology_key, &rule.selector, 0);
            let universe = self.domain_universe(&rule.topology_key);
            let group = &self.groups[group];
            let open: BTreeSet<String> = universe
                .into_iter()
                .filter(|d| group.count(d) == 0 && node_req.admits(&rule.topology_key, d))
                .collect();
            if open.is_empty() {
                return Err(SchedulerError::TopologyViolation {
                    key: rule.topology_key.clone(),
                });
            }
            combined.add(&rule.topology_key, Operator::In, open);
        }

        Ok(combined)
    }

    /// Records a tentative placement on a proposed node, taking each
    /// topology key's domain from the node's requirement set.
    pub fn record(&mut self, workload: &Workload, node_req: &RequirementSet) {
        self.record_with(workload, |key| node_req.any(key).map(str::to_string));
    }

    /// Records a placement on a real node, taking domains from its labels.
    pub fn record_labels(&mut self, workload: &Workload, labels: &BTreeMap<String, String>) {
        self.record_with(workload, |key| labels.get(key).cloned());
    }

    /// Recomputes a workload's recorded contribution after relaxation
    /// changed its rule set. A no-op for workloads that never contributed —
    /// the usual case, since only failed (hence unplaced) workloads relax.
    pub fn update(&mut self, workload: &Workload) {
        let Some(entries) = self.contributions.remove(&workload.id) else {
            return;
        };
        warn!(workload = %workload.id, "relaxed a workload with recorded topology state");
        for (group, domain) in entries {
            if let Some(count) = self.groups[group].counts.get_mut(&domain) {
                *count = count.saturating_sub(1);
            }
        }
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Ensures groups exist for every rule the workload declares. Soft
    /// rules register too: their counts must be warm if a later relaxation
    /// downgrade or a sibling hard rule needs them.
    fn register(&mut self, workload: &Workload) {
        for rule in &workload.spread_constraints {
            self.group_index(
                GroupKind::Spread,
                &rule.topology_key,
                &rule.selector,
                rule.max_skew,
            );
        }
        for rule in workload
            .pod_affinity
            .iter()
            .chain(&workload.preferred_pod_affinity)
        {
            self.group_index(GroupKind::Affinity, &rule.topology_key, &rule.selector, 0);
        }
        for rule in workload
            .pod_anti_affinity
            .iter()
            .chain(&workload.preferred_pod_anti_affinity)
        {
            self.group_index(GroupKind::AntiAffinity, &rule.topology_key, &rule.selector, 0);
        }
    }

    fn group_index(
        &mut self,
        kind: GroupKind,
        topology_key: &str,
        selector: &BTreeMap<String, String>,
        max_skew: u32,
    ) -> usize {
        if let Some(index) = self.groups.iter().position(|g| {
            g.kind == kind
                && g.topology_key == topology_key
                && g.selector == *selector
                && g.max_skew == max_skew
        }) {
            return index;
        }
        self.groups.push(TopologyGroup {
            kind,
            topology_key: topology_key.to_string(),
            selector: selector.clone(),
            max_skew,
            counts: BTreeMap::new(),
        });
        self.groups.len() - 1
    }

    fn domain_universe(&self, key: &str) -> BTreeSet<String> {
        self.domains.get(key).cloned().unwrap_or_default()
    }

    fn record_with<F>(&mut self, workload: &Workload, domain_of: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut entries = Vec::new();
        for (index, group) in self.groups.iter_mut().enumerate() {
            if !selector_matches(&group.selector, &workload.labels) {
                continue;
            }
            let Some(domain) = domain_of(&group.topology_key) else {
                continue;
            };
            *group.counts.entry(domain.clone()).or_insert(0) += 1;
            entries.push((index, domain.clone()));
            self.domains
                .entry(group.topology_key.clone())
                .or_default()
                .insert(domain);
        }
        if !entries.is_empty() {
            self.contributions
                .entry(workload.id.clone())
                .or_default()
                .extend(entries);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::SpreadConstraint;

    fn labels_of(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn spread_workload(id: &str, app: &str, max_skew: u32) -> Workload {
        Workload {
            id: id.to_string(),
            labels: labels_of(&[("app", app)]),
            spread_constraints: vec![SpreadConstraint {
                topology_key: "zone".to_string(),
                max_skew,
                when_unsatisfiable: WhenUnsatisfiable::DoNotSchedule,
                selector: labels_of(&[("app", app)]),
            }],
            ..Workload::default()
        }
    }

    fn two_zone_topology() -> Topology {
        let mut topology = Topology::default();
        topology.register_domain("zone", "z1");
        topology.register_domain("zone", "z2");
        topology
    }

    #[test]
    fn spread_picks_least_loaded_domain() {
        let mut topology = two_zone_topology();
        let w1 = spread_workload("a1", "a", 1);

        let req = topology
            .requirements_for(&w1, &RequirementSet::new())
            .unwrap();
        // Empty counts: lexicographically-first zone wins.
        assert_eq!(req.any("zone"), Some("z1"));

        let node_req = RequirementSet::new().with("zone", Operator::In, ["z1"]);
        topology.record(&w1, &node_req);

        // z1 now holds one; the next placement must go to z2.
        let w2 = spread_workload("a2", "a", 1);
        let req = topology
            .requirements_for(&w2, &RequirementSet::new())
            .unwrap();
        assert_eq!(req.any("zone"), Some("z2"));
    }

    #[test]
    fn spread_violation_when_node_pins_overloaded_zone() {
        let mut topology = two_zone_topology();
        let w1 = spread_workload("a1", "a", 1);
        topology
            .requirements_for(&w1, &RequirementSet::new())
            .unwrap();
        topology.record(&w1, &RequirementSet::new().with("zone", Operator::In, ["z1"]));

        // A node pinned to z1 cannot take another "a" workload at skew 1
        // while z2 sits empty.
        let w2 = spread_workload("a2", "a", 1);
        let pinned = RequirementSet::new().with("zone", Operator::In, ["z1"]);
        let err = topology.requirements_for(&w2, &pinned).unwrap_err();
        assert!(matches!(err, SchedulerError::TopologyViolation { key } if key == "zone"));
    }

    #[test]
    fn soft_spread_rules_never_restrict() {
        let mut topology = two_zone_topology();
        let mut w = spread_workload("a1", "a", 1);
        w.spread_constraints[0].when_unsatisfiable = WhenUnsatisfiable::ScheduleAnyway;

        let req = topology
            .requirements_for(&w, &RequirementSet::new())
            .unwrap();
        assert!(!req.has("zone"));
    }

    #[test]
    fn affinity_requires_an_occupied_domain() {
        let mut topology = Topology::default();
        topology.register_domain("zone", "z1");

        let seeker = Workload {
            id: "x".to_string(),
            pod_affinity: vec![gantry_core::AffinityTerm {
                topology_key: "zone".to_string(),
                selector: labels_of(&[("app", "y")]),
            }],
            ..Workload::default()
        };
        let err = topology
            .requirements_for(&seeker, &RequirementSet::new())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::TopologyViolation { .. }));

        // Place a matching workload in z1; the seeker must now follow it.
        let anchor = Workload {
            id: "y".to_string(),
            labels: labels_of(&[("app", "y")]),
            ..Workload::default()
        };
        topology.record_labels(&anchor, &labels_of(&[("zone", "z1")]));

        let req = topology
            .requirements_for(&seeker, &RequirementSet::new())
            .unwrap();
        assert_eq!(req.any("zone"), Some("z1"));
    }

    #[test]
    fn self_affinity_seeds_anywhere() {
        let mut topology = Topology::default();
        topology.register_domain("zone", "z1");

        let w = Workload {
            id: "x".to_string(),
            labels: labels_of(&[("app", "x")]),
            pod_affinity: vec![gantry_core::AffinityTerm {
                topology_key: "zone".to_string(),
                selector: labels_of(&[("app", "x")]),
            }],
            ..Workload::default()
        };
        let req = topology
            .requirements_for(&w, &RequirementSet::new())
            .unwrap();
        assert!(!req.has("zone"), "first of its group goes anywhere");
    }

    #[test]
    fn anti_affinity_only_admits_empty_domains() {
        let mut topology = Topology::default();
        topology.register_domain("host", "n1");
        topology.register_domain("host", "n2");

        let w1 = Workload {
            id: "a1".to_string(),
            labels: labels_of(&[("app", "a")]),
            pod_anti_affinity: vec![gantry_core::AffinityTerm {
                topology_key: "host".to_string(),
                selector: labels_of(&[("app", "a")]),
            }],
            ..Workload::default()
        };
        let req = topology
            .requirements_for(&w1, &RequirementSet::new())
            .unwrap();
        assert_eq!(req.values("host").unwrap().len(), 2);

        topology.record_labels(&w1, &labels_of(&[("host", "n1")]));

        let mut w2 = w1.clone();
        w2.id = "a2".to_string();
        let req = topology
            .requirements_for(&w2, &RequirementSet::new())
            .unwrap();
        assert_eq!(req.any("host"), Some("n2"));

        topology.record_labels(&w2, &labels_of(&[("host", "n2")]));

        let mut w3 = w1.clone();
        w3.id = "a3".to_string();
        let err = topology
            .requirements_for(&w3, &RequirementSet::new())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::TopologyViolation { .. }));
    }

    #[test]
    fn counts_include_cluster_bound_workloads() {
        let bound = Workload {
            id: "existing".to_string(),
            labels: labels_of(&[("app", "a")]),
            ..Workload::default()
        };
        let node = gantry_state::Node {
            name: "n1".to_string(),
            labels: labels_of(&[("zone", "z1")]),
            bound: vec![bound],
            ..gantry_state::Node::default()
        };
        let snapshot = ClusterSnapshot::new(vec![node]);
        let batch = vec![spread_workload("a1", "a", 1)];

        let mut topology = Topology::new(&snapshot, &[], &[], &batch);
        topology.register_domain("zone", "z2");

        // z1 already holds the bound workload, so the batch workload is
        // steered to z2.
        let req = topology
            .requirements_for(&batch[0], &RequirementSet::new())
            .unwrap();
        assert_eq!(req.any("zone"), Some("z2"));
    }
}
