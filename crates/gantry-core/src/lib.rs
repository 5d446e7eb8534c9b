//! gantry-core — domain types and the label-requirement algebra.
//!
//! Everything the planner reasons about lives here:
//!
//! - `Resources` — named quantity vectors and the capacity arithmetic
//! - `RequirementSet` — the per-label constraint algebra (In / NotIn /
//!   Exists / DoesNotExist) with intersection and conflict detection
//! - `Taint` / `Toleration` — node repulsion and workload exemptions
//! - `Workload` — a schedulable unit with demands, affinities, spread
//!   rules, tolerations and host-port requests
//! - `InstanceType` / `Offering` — purchasable capacity per zone and
//!   capacity type
//! - `NodeTemplate` / `Provisioner` — provisioning profiles and limit
//!   envelopes
//!
//! The crate is deliberately free of scheduling policy; it only provides
//! the vocabulary that `gantry-state` and `gantry-scheduler` build on.

pub mod instance;
pub mod labels;
pub mod requirements;
pub mod resources;
pub mod taints;
pub mod template;
pub mod workload;

pub use instance::{InstanceType, Offering};
pub use requirements::{Operator, RequirementSet, ValueSet};
pub use resources::{Quantity, Resources};
pub use taints::{Taint, TaintEffect, Toleration};
pub use template::{NodeTemplate, Provisioner};
pub use workload::{
    AffinityTerm, HostPortRequest, NodeRequirement, Protocol, SpreadConstraint,
    WhenUnsatisfiable, Workload, selector_matches,
};
