//! Instance types and their offerings.

use serde::{Deserialize, Serialize};

use crate::labels;
use crate::requirements::RequirementSet;
use crate::resources::Resources;

/// One purchasable (capacity-type, zone) combination of an instance type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offering {
    pub zone: String,
    pub capacity_type: String,
    pub price: f64,
    pub available: bool,
}

/// A launchable machine shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceType {
    pub name: String,
    /// Ordering key; the scheduler sorts its pool cheapest-first once.
    pub price: f64,
    pub resources: Resources,
    pub architecture: String,
    pub os: String,
    pub offerings: Vec<Offering>,
}

impl InstanceType {
    /// True when this type could back a node carrying `requirements`:
    /// its identity labels are admissible and at least one available
    /// offering fits the zone and capacity-type constraints.
    pub fn compatible_with(&self, requirements: &RequirementSet) -> bool {
        requirements.admits(labels::INSTANCE_TYPE, &self.name)
            && requirements.admits(labels::ARCH, &self.architecture)
            && requirements.admits(labels::OS, &self.os)
            && self.offerings.iter().any(|o| {
                o.available
                    && requirements.admits(labels::ZONE, &o.zone)
                    && requirements.admits(labels::CAPACITY_TYPE, &o.capacity_type)
            })
    }
}
