//! Node templates and provisioners.

use serde::{Deserialize, Serialize};

use crate::requirements::RequirementSet;
use crate::resources::Resources;
use crate::taints::Taint;

/// A provisioning profile: the label constraints, taints and ownership of
/// nodes launched from it. Template declaration order is policy — the
/// scheduler tries templates in the order they were handed over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTemplate {
    pub name: String,
    /// Owning provisioner; templates sharing a provisioner share its
    /// resource-limit budget.
    pub provisioner: String,
    pub requirements: RequirementSet,
    pub taints: Vec<Taint>,
    /// Taints applied only while a node boots; implicitly tolerated by
    /// everything the planner places.
    pub startup_taints: Vec<Taint>,
}

/// A named capacity budget. `limits: None` means unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provisioner {
    pub name: String,
    pub limits: Option<Resources>,
}
