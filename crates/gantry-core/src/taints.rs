//! Node taints and workload tolerations.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaintEffect {
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
}

impl TaintEffect {
    /// PreferNoSchedule is advisory; only the other effects block admission.
    pub fn blocks_scheduling(self) -> bool {
        !matches!(self, TaintEffect::PreferNoSchedule)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,
    pub value: String,
    pub effect: TaintEffect,
}

/// A workload's exemption from a taint. `None` fields match anything, so
/// the zero value tolerates every taint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toleration {
    pub key: Option<String>,
    pub value: Option<String>,
    pub effect: Option<TaintEffect>,
}

impl Toleration {
    pub fn tolerates(&self, taint: &Taint) -> bool {
        if let Some(key) = &self.key
            && key != &taint.key
        {
            return false;
        }
        if let Some(value) = &self.value
            && value != &taint.value
        {
            return false;
        }
        if let Some(effect) = self.effect
            && effect != taint.effect
        {
            return false;
        }
        true
    }
}
