//! Preference relaxation.
//!
//! Soft constraints bind until placement keeps failing; each call strips
//! exactly one layer so a workload gradually trades preferences for a
//! spot somewhere. Relaxation order is fixed: node-affinity preferences
//! first (the cheapest to give up), hard spread rules last.

use tracing::debug;

use gantry_core::{WhenUnsatisfiable, Workload};

#[derive(Debug, Default)]
pub struct Preferences;

impl Preferences {
    /// Removes one layer of soft constraints from the workload.
    /// Returns whether anything changed.
    pub fn relax(&self, workload: &mut Workload) -> bool {
        if !workload.preferred_affinity.is_empty() {
            debug!(workload = %workload.id, "relaxing preferred node affinity");
            workload.preferred_affinity.clear();
            return true;
        }
        if !workload.preferred_pod_affinity.is_empty() {
            debug!(workload = %workload.id, "relaxing preferred pod affinity");
            workload.preferred_pod_affinity.clear();
            return true;
        }
        if !workload.preferred_pod_anti_affinity.is_empty() {
            debug!(workload = %workload.id, "relaxing preferred pod anti-affinity");
            workload.preferred_pod_anti_affinity.clear();
            return true;
        }
        // Downgrade one hard spread rule per invocation, in declaration order.
        if let Some(rule) = workload
            .spread_constraints
            .iter_mut()
            .find(|r| r.when_unsatisfiable == WhenUnsatisfiable::DoNotSchedule)
        {
            debug!(
                workload = %workload.id,
                topology_key = %rule.topology_key,
                "downgrading topology spread rule to schedule-anyway"
            );
            rule.when_unsatisfiable = WhenUnsatisfiable::ScheduleAnyway;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{AffinityTerm, NodeRequirement, Operator, SpreadConstraint};
    use std::collections::BTreeMap;

    fn spread(key: &str, hard: bool) -> SpreadConstraint {
        SpreadConstraint {
            topology_key: key.to_string(),
            max_skew: 1,
            when_unsatisfiable: if hard {
                WhenUnsatisfiable::DoNotSchedule
            } else {
                WhenUnsatisfiable::ScheduleAnyway
            },
            selector: BTreeMap::from([("app".to_string(), "web".to_string())]),
        }
    }

    fn affinity(key: &str) -> AffinityTerm {
        AffinityTerm {
            topology_key: key.to_string(),
            selector: BTreeMap::from([("app".to_string(), "web".to_string())]),
        }
    }

    #[test]
    fn layers_strip_in_order() {
        let mut w = Workload {
            preferred_affinity: vec![NodeRequirement {
                key: "gpu".to_string(),
                operator: Operator::In,
                values: vec!["true".to_string()],
            }],
            preferred_pod_affinity: vec![affinity("zone")],
            preferred_pod_anti_affinity: vec![affinity("host")],
            spread_constraints: vec![spread("zone", true), spread("host", true)],
            ..Workload::default()
        };
        let relaxer = Preferences;

        assert!(relaxer.relax(&mut w));
        assert!(w.preferred_affinity.is_empty());
        assert!(!w.preferred_pod_affinity.is_empty());

        assert!(relaxer.relax(&mut w));
        assert!(w.preferred_pod_affinity.is_empty());

        assert!(relaxer.relax(&mut w));
        assert!(w.preferred_pod_anti_affinity.is_empty());

        // Spread rules downgrade one at a time, in declaration order.
        assert!(relaxer.relax(&mut w));
        assert_eq!(
            w.spread_constraints[0].when_unsatisfiable,
            WhenUnsatisfiable::ScheduleAnyway
        );
        assert_eq!(
            w.spread_constraints[1].when_unsatisfiable,
            WhenUnsatisfiable::DoNotSchedule
        );

        assert!(relaxer.relax(&mut w));
        assert!(!relaxer.relax(&mut w), "nothing left to relax");
    }

    #[test]
    fn fully_hard_workload_cannot_relax() {
        let mut w = Workload {
            spread_constraints: vec![spread("zone", false)],
            ..Workload::default()
        };
        assert!(!Preferences.relax(&mut w));
    }
}
