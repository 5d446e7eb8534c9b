//! Scheduling event notifications.

use tracing::{error, info};

use gantry_core::Workload;

use crate::error::SchedulerError;

/// Side-effect-only notifications emitted once per solve. Implementations
/// must not fail; anything that can go wrong downstream (event bus, API
/// server) is the implementation's problem to log and swallow.
pub trait EventRecorder {
    /// The workload fits on already-launched capacity and should bind once
    /// that node turns ready.
    fn workload_should_schedule(&self, workload: &Workload, node: &str);

    /// The workload exhausted every placement option and relaxation layer;
    /// `error` is from its final attempt.
    fn workload_failed_to_schedule(&self, workload: &Workload, error: &SchedulerError);
}

/// Recorder that forwards events to the tracing subscriber.
#[derive(Debug, Default)]
pub struct LogRecorder;

impl EventRecorder for LogRecorder {
    fn workload_should_schedule(&self, workload: &Workload, node: &str) {
        info!(workload = %workload.id, node, "workload fits on existing capacity");
    }

    fn workload_failed_to_schedule(&self, workload: &Workload, error: &SchedulerError) {
        error!(workload = %workload.id, %error, "workload failed to schedule");
    }
}
