//! Daemon overhead accounting.
//!
//! Cluster-wide daemon workloads land on every node that matches their
//! requirements, so each template carries a standing reservation equal to
//! the summed demands of the daemons that would target its nodes. Computed
//! once per scheduler construction.

use std::collections::BTreeMap;

use gantry_core::{NodeTemplate, Resources, Workload};

/// Per-template resource reservation for daemon workloads.
pub fn daemon_overhead(
    templates: &[NodeTemplate],
    daemons: &[Workload],
) -> BTreeMap<String, Resources> {
    templates
        .iter()
        .map(|template| {
            let mut total = Resources::new();
            for daemon in daemons {
                if targets_template(daemon, template) {
                    total.add_assign(&daemon.demands);
                }
            }
            (template.name.clone(), total)
        })
        .collect()
}

/// A daemon targets a template when its requirements are compatible with
/// the template's and it tolerates the template's taints. Startup taints
/// are gone by the time daemons run, so they are not consulted.
fn targets_template(daemon: &Workload, template: &NodeTemplate) -> bool {
    let combined = template.requirements.intersect(&daemon.hard_requirements());
    if combined.conflict().is_some() {
        return false;
    }
    template
        .taints
        .iter()
        .all(|taint| !taint.effect.blocks_scheduling() || daemon.tolerates(taint))
}
