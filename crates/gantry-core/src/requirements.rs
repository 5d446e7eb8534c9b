//! Label requirement algebra.
//!
//! A `RequirementSet` holds, per label key, the set of values a node may
//! carry for that key. Clauses fold in with set-intersection semantics, so
//! a node template's constraints, a workload's node selector and the
//! topology engine's domain restrictions can all be combined with one
//! operation and checked for contradiction afterwards.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Constraint operators over a label key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// Normalized admissible-value state for a single key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueSet {
    /// Key present with a value from the set. An empty set admits nothing.
    In(BTreeSet<String>),
    /// Any value outside `excluded`. `must_exist` distinguishes `Exists`
    /// (label required) from plain `NotIn` (an absent label also matches).
    NotIn {
        excluded: BTreeSet<String>,
        must_exist: bool,
    },
    /// Key must be absent.
    Absent,
    /// Contradictory clauses, e.g. `Exists` folded with `DoesNotExist`.
    Conflict,
}

impl ValueSet {
    fn from_clause<I, S>(operator: Operator, values: I) -> ValueSet
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        match operator {
            Operator::In => ValueSet::In(values),
            Operator::NotIn => ValueSet::NotIn {
                excluded: values,
                must_exist: false,
            },
            Operator::Exists => ValueSet::NotIn {
                excluded: BTreeSet::new(),
                must_exist: true,
            },
            Operator::DoesNotExist => ValueSet::Absent,
        }
    }

    fn intersect(&self, other: &ValueSet) -> ValueSet {
        use ValueSet::*;
        match (self, other) {
            (Conflict, _) | (_, Conflict) => Conflict,
            (Absent, Absent) => Absent,
            (Absent, _) | (_, Absent) => Conflict,
            (In(a), In(b)) => In(a.intersection(b).cloned().collect()),
            (In(a), NotIn { excluded, .. }) | (NotIn { excluded, .. }, In(a)) => {
                In(a.difference(excluded).cloned().collect())
            }
            (
                NotIn { excluded: a, must_exist: ma },
                NotIn { excluded: b, must_exist: mb },
            ) => NotIn {
                excluded: a.union(b).cloned().collect(),
                must_exist: *ma || *mb,
            },
        }
    }

    /// True when no value can satisfy the key anymore.
    pub fn is_empty(&self) -> bool {
        matches!(self, ValueSet::Conflict) || matches!(self, ValueSet::In(s) if s.is_empty())
    }

    /// Would a label with this concrete value satisfy the constraint?
    pub fn admits(&self, value: &str) -> bool {
        match self {
            ValueSet::In(s) => s.contains(value),
            ValueSet::NotIn { excluded, .. } => !excluded.contains(value),
            ValueSet::Absent | ValueSet::Conflict => false,
        }
    }

    /// True when the constraint cannot be met by a node lacking the label.
    pub fn requires_presence(&self) -> bool {
        matches!(self, ValueSet::In(_) | ValueSet::NotIn { must_exist: true, .. })
    }
}

/// A set of per-key value constraints combined by intersection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementSet {
    keys: BTreeMap<String, ValueSet>,
}

impl RequirementSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// One `In` clause per label, the way a node's own labels constrain it.
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Self {
        let mut set = Self::new();
        for (key, value) in labels {
            set.add(key, Operator::In, [value.clone()]);
        }
        set
    }

    /// Folds a clause into the set with intersection semantics.
    pub fn add<I, S>(&mut self, key: &str, operator: Operator, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let clause = ValueSet::from_clause(operator, values);
        match self.keys.get(key) {
            Some(existing) => {
                let merged = existing.intersect(&clause);
                self.keys.insert(key.to_string(), merged);
            }
            None => {
                self.keys.insert(key.to_string(), clause);
            }
        }
    }

    /// Builder-style `add`.
    pub fn with<I, S>(mut self, key: &str, operator: Operator, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add(key, operator, values);
        self
    }

    /// Pairwise fold; keys present on one side only carry over unconstrained.
    pub fn intersect(&self, other: &RequirementSet) -> RequirementSet {
        let mut out = self.clone();
        for (key, clause) in &other.keys {
            match out.keys.get(key) {
                Some(existing) => {
                    let merged = existing.intersect(clause);
                    out.keys.insert(key.clone(), merged);
                }
                None => {
                    out.keys.insert(key.clone(), clause.clone());
                }
            }
        }
        out
    }

    pub fn has(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&ValueSet> {
        self.keys.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ValueSet)> {
        self.keys.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True when the key's admissible value set became empty.
    pub fn is_empty(&self, key: &str) -> bool {
        self.keys.get(key).is_some_and(ValueSet::is_empty)
    }

    /// The first key (in sorted order) whose value set is unsatisfiable.
    pub fn conflict(&self) -> Option<&str> {
        self.keys
            .iter()
            .find(|(_, v)| v.is_empty())
            .map(|(k, _)| k.as_str())
    }

    /// Admissible values for an `In`-constrained key.
    pub fn values(&self, key: &str) -> Option<&BTreeSet<String>> {
        match self.keys.get(key) {
            Some(ValueSet::In(values)) => Some(values),
            _ => None,
        }
    }

    /// A deterministic representative value for an `In`-constrained key.
    pub fn any(&self, key: &str) -> Option<&str> {
        self.values(key)
            .and_then(|v| v.iter().next())
            .map(String::as_str)
    }

    /// Would a node with `value` for `key` remain admissible? Unconstrained
    /// keys admit everything.
    pub fn admits(&self, key: &str, value: &str) -> bool {
        match self.keys.get(key) {
            Some(clause) => clause.admits(value),
            None => true,
        }
    }

    /// Checks every constraint against a concrete label map, returning the
    /// first violated key.
    pub fn satisfied_by(&self, labels: &BTreeMap<String, String>) -> Result<(), &str> {
        for (key, clause) in &self.keys {
            let ok = match (clause, labels.get(key)) {
                (ValueSet::In(s), Some(v)) => s.contains(v),
                (ValueSet::NotIn { excluded, .. }, Some(v)) => !excluded.contains(v),
                (ValueSet::NotIn { must_exist, .. }, None) => !must_exist,
                (ValueSet::Absent, None) => true,
                (ValueSet::Absent, Some(_)) => false,
                (ValueSet::In(_), None) => false,
                (ValueSet::Conflict, _) => false,
            };
            if !ok {
                return Err(key);
            }
        }
        Ok(())
    }
}
