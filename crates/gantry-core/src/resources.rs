//! Resource quantity vectors.
//!
//! All capacity accounting is done over named quantities: "cpu" in
//! millicores, "memory" in bytes, anything else as a plain count. Keys are
//! kept sorted so iteration order (and therefore every scheduling decision
//! derived from it) is deterministic.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Millicores for CPU, bytes for memory, a count for everything else.
pub type Quantity = i64;

/// A vector of named resource quantities.
///
/// Quantities may go negative: a provisioner budget that has been
/// pessimistically debited below zero simply admits no further instances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources(BTreeMap<String, Quantity>);

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion, mostly for construction sites and tests.
    pub fn with(mut self, name: &str, quantity: Quantity) -> Self {
        self.0.insert(name.to_string(), quantity);
        self
    }

    /// The quantity for `name`, zero when absent.
    pub fn get(&self, name: &str) -> Quantity {
        self.0.get(name).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Quantity)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Element-wise sum.
    pub fn add(&self, other: &Resources) -> Resources {
        let mut out = self.clone();
        out.add_assign(other);
        out
    }

    pub fn add_assign(&mut self, other: &Resources) {
        for (name, quantity) in other.iter() {
            *self.0.entry(name.to_string()).or_insert(0) += quantity;
        }
    }

    /// Element-wise difference. The result may go negative.
    pub fn subtract(&self, other: &Resources) -> Resources {
        let mut out = self.clone();
        for (name, quantity) in other.iter() {
            *out.0.entry(name.to_string()).or_insert(0) -= quantity;
        }
        out
    }

    /// Element-wise maximum.
    pub fn max(&self, other: &Resources) -> Resources {
        let mut out = self.clone();
        for (name, quantity) in other.iter() {
            let slot = out.0.entry(name.to_string()).or_insert(quantity);
            *slot = (*slot).max(quantity);
        }
        out
    }

    /// True when every demand in `self` is covered by `capacity`.
    /// A resource absent from `capacity` counts as zero.
    pub fn fits(&self, capacity: &Resources) -> bool {
        self.iter().all(|(name, quantity)| quantity <= capacity.get(name))
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, quantity) in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{name}={quantity}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromIterator<(String, Quantity)> for Resources {
    fn from_iter<I: IntoIterator<Item = (String, Quantity)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
