//! Progress-detecting retry queue.
//!
//! Failed workloads are always re-enqueued: a later placement may change
//! topology counts or open capacity that makes an earlier failure
//! schedulable (pod affinity within a batch, alternating zonal spreads).
//! The queue stops handing out a workload once nothing has changed since
//! its last attempt, which bounds the retry loop without giving up too
//! early.

use std::collections::{BTreeMap, VecDeque};

use gantry_core::Workload;

pub struct Queue {
    items: VecDeque<Workload>,
    /// Queue length at each workload's most recent attempt. An unchanged
    /// length means no other workload left the queue in between — no
    /// progress, so retrying would loop forever.
    last_len: BTreeMap<String, usize>,
}

impl Queue {
    pub fn new(workloads: Vec<Workload>) -> Self {
        Self {
            items: workloads.into(),
            last_len: BTreeMap::new(),
        }
    }

    /// Next workload to attempt, or `None` when the queue is empty or has
    /// stopped making progress.
    pub fn pop(&mut self) -> Option<Workload> {
        let front = self.items.front()?;
        if self.last_len.get(&front.id) == Some(&self.items.len()) {
            return None;
        }
        self.last_len.insert(front.id.clone(), self.items.len());
        self.items.pop_front()
    }

    /// Re-enqueues a failed workload. A relaxation resets the progress
    /// ledger: the constraint set shrank, so every stalled workload
    /// deserves another attempt.
    pub fn push(&mut self, workload: Workload, relaxed: bool) {
        self.items.push_back(workload);
        if relaxed {
            self.last_len.clear();
        }
    }

    /// Everything that never scheduled, in queue order.
    pub fn into_remaining(self) -> Vec<Workload> {
        self.items.into()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
