//! Scheduler error types.

use thiserror::Error;

use gantry_core::{Resources, TaintEffect};
use gantry_state::StateError;

use crate::node::ProposedNode;

/// Errors raised while placing workloads. Placement errors are local to
/// one attempt — they never abort a solve; only `Cancelled` is fatal.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("demands {demands} exceed the capacity of every viable instance type")]
    ResourceOverflow { demands: Resources },

    #[error("no admissible values remain for label {key:?}")]
    RequirementConflict { key: String },

    #[error("does not tolerate taint {key}={value}:{effect:?}")]
    TaintIntolerance {
        key: String,
        value: String,
        effect: TaintEffect,
    },

    #[error(transparent)]
    HostPort(#[from] StateError),

    #[error("no admissible topology domain for {key:?}")]
    TopologyViolation { key: String },

    #[error("all available instance types exceed the limits of provisioner {provisioner:?}")]
    LimitExceeded { provisioner: String },

    /// One entry per attempted placement target.
    #[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Aggregate(Vec<SchedulerError>),

    #[error("solve cancelled with {} node(s) planned", .partial.len())]
    Cancelled { partial: Vec<ProposedNode> },
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
