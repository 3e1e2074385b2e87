//! Identity-compared capability handles and capability sets.
//!
//! A [`Capability`] is an opaque handle to a resource cost vector, declared
//! once at configuration time and passed by reference everywhere. Equality
//! and hashing go by allocation identity, never by cost values: two
//! separately constructed capabilities with identical costs are distinct.
//! This makes shared constants the only way for tasks and actor declarations
//! to refer to the same capability, which is exactly the contract the
//! scheduler's matching relies on.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Per-axis resource amounts, keyed by axis name.
pub type ResourceMap = BTreeMap<String, u64>;

struct CapabilityInner {
    name: Option<String>,
    cost: ResourceMap,
}

/// One identity-compared unit of resource cost along one or more axes.
///
/// Cheap to clone; clones share the underlying handle and compare equal.
#[derive(Clone)]
pub struct Capability {
    inner: Arc<CapabilityInner>,
}

impl Capability {
    /// Declare an anonymous capability with the given per-axis cost.
    pub fn new<I, K>(cost: I) -> Self
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<String>,
    {
        Self {
            inner: Arc::new(CapabilityInner {
                name: None,
                cost: cost.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            }),
        }
    }

    /// Declare a named capability; the name only shows up in diagnostics.
    pub fn named<I, K>(cost: I, name: &str) -> Self
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<String>,
    {
        Self {
            inner: Arc::new(CapabilityInner {
                name: Some(name.to_owned()),
                cost: cost.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            }),
        }
    }

    /// Diagnostic name, if one was given at declaration.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Per-axis cost of this capability.
    pub fn cost(&self) -> &ResourceMap {
        &self.inner.cost
    }

    /// Cost summed across all axes.
    pub fn total_units(&self) -> u64 {
        self.inner.cost.values().sum()
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Capability {}

impl Hash for Capability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "Capability({name})"),
            None => write!(f, "Capability(@{:x})", self.key()),
        }
    }
}

/// The full resource/role profile of one actor type: an immutable set of
/// [`Capability`] handles, compared by member identity.
#[derive(Clone)]
pub struct CapabilitySet {
    members: Vec<Capability>,
}

impl CapabilitySet {
    /// Build a set from capability handles, dropping identity duplicates
    /// while preserving first-occurrence order.
    pub fn new<I>(members: I) -> Self
    where
        I: IntoIterator<Item = Capability>,
    {
        let mut unique: Vec<Capability> = Vec::new();
        for cap in members {
            if !unique.contains(&cap) {
                unique.push(cap);
            }
        }
        Self { members: unique }
    }

    /// Member capabilities in declaration order.
    pub fn members(&self) -> &[Capability] {
        &self.members
    }

    /// Whether the set holds this exact capability handle.
    pub fn contains(&self, capability: &Capability) -> bool {
        self.members.contains(capability)
    }

    /// Superset test: every required handle is a member of this set.
    pub fn satisfies(&self, requirements: &[Capability]) -> bool {
        requirements.iter().all(|req| self.contains(req))
    }

    /// Total per-axis cost across all member capabilities.
    pub fn total_cost(&self) -> ResourceMap {
        let mut total = ResourceMap::new();
        for cap in &self.members {
            for (axis, units) in cap.cost() {
                *total.entry(axis.clone()).or_insert(0) += units;
            }
        }
        total
    }

    /// Total cost summed across all axes; the ranking key for selecting the
    /// cheapest qualifying profile.
    pub fn total_units(&self) -> u64 {
        self.members.iter().map(Capability::total_units).sum()
    }

    /// Number of distinct member capabilities.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the set has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl PartialEq for CapabilitySet {
    fn eq(&self, other: &Self) -> bool {
        if self.members.len() != other.members.len() {
            return false;
        }
        self.members.iter().all(|m| other.contains(m))
    }
}

impl Eq for CapabilitySet {}

impl Hash for CapabilitySet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut keys: Vec<usize> = self.members.iter().map(Capability::key).collect();
        keys.sort_unstable();
        keys.hash(state);
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.members.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identical_costs_are_distinct_capabilities() {
        let a = Capability::new([("cpu", 1)]);
        let b = Capability::new([("cpu", 1)]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());

        let mut seen = HashSet::new();
        seen.insert(a.clone());
        assert!(!seen.contains(&b));
        assert!(seen.contains(&a));
    }

    #[test]
    fn set_dedups_by_identity() {
        let a = Capability::named([("cpu", 1)], "a");
        let b = Capability::named([("mem", 2)], "b");
        let set = CapabilitySet::new([a.clone(), b.clone(), a.clone()]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&a));
        assert!(set.contains(&b));
    }

    #[test]
    fn satisfies_is_a_superset_test() {
        let a = Capability::new([("cpu", 1)]);
        let b = Capability::new([("conn", 100)]);
        let c = Capability::new([("mem", 50)]);
        let set = CapabilitySet::new([a.clone(), b.clone()]);

        assert!(set.satisfies(&[a.clone()]));
        assert!(set.satisfies(&[a.clone(), b.clone()]));
        assert!(set.satisfies(&[]));
        assert!(!set.satisfies(&[c]));
    }

    #[test]
    fn total_cost_sums_per_axis() {
        let a = Capability::new([("cpu", 1), ("mem", 100)]);
        let b = Capability::new([("mem", 50)]);
        let set = CapabilitySet::new([a, b]);

        let cost = set.total_cost();
        assert_eq!(cost.get("cpu"), Some(&1));
        assert_eq!(cost.get("mem"), Some(&150));
        assert_eq!(set.total_units(), 151);
    }

    #[test]
    fn sets_compare_by_member_identity() {
        let a = Capability::new([("cpu", 1)]);
        let b = Capability::new([("cpu", 1)]);
        let s1 = CapabilitySet::new([a.clone()]);
        let s2 = CapabilitySet::new([a]);
        let s3 = CapabilitySet::new([b]);
        assert_eq!(s1, s2);
        assert_ne!(s1, s3);
    }
}
