//! # Normalized topology and link computation.
//!
//! [`Topology`] validates a list of [`GroupSpec`]s and **symmetrizes** their
//! peer lists: if `A` names `B`, then `B` is treated as naming `A`. Unknown
//! peer names are dropped with a warning.
//!
//! ## Link rule
//! ```text
//! self-linked group G (N instances):   G#i <-> G#j   for all 1 <= i < j <= N
//! linked groups G (N) and H (M):       G#i <-> H#j   for all i in 1..=N, j in 1..=M
//! ```
//! Every link becomes one Port whose two ends go to the two instances' bundles.
//! [`Topology::peers_of`] applies the same rule restricted to one instance,
//! which is what revival uses to re-wire a single unit.

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use crate::error::TopologyError;
use crate::runtime::EntryRef;
use crate::topology::{Addressee, GroupSpec, MAIN_POOL};

/// One validated group with its symmetrized peer set.
#[derive(Clone)]
pub struct Group {
    name: String,
    instances: u32,
    entry: EntryRef,
    peers: IndexSet<String>,
    data: Value,
}

impl Group {
    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of instances (dense `1..=N`).
    pub fn instances(&self) -> u32 {
        self.instances
    }

    /// Entry point executed by every instance.
    pub fn entry(&self) -> &EntryRef {
        &self.entry
    }

    /// Symmetrized peer group names (may include the group itself).
    pub fn peers(&self) -> impl Iterator<Item = &str> {
        self.peers.iter().map(String::as_str)
    }

    /// True if every instance pair inside the group is linked.
    pub fn is_self_linked(&self) -> bool {
        self.peers.contains(&self.name)
    }

    /// Payload handed to every instance.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Addressees of all instances.
    pub fn addressees(&self) -> impl Iterator<Item = Addressee> + '_ {
        (1..=self.instances).map(|n| Addressee::new(self.name.as_str(), n))
    }
}

/// Validated, symmetrized topology declaration.
#[derive(Clone)]
pub struct Topology {
    groups: IndexMap<String, Group>,
}

impl Topology {
    /// Validates and normalizes the declared groups.
    ///
    /// ### Errors
    /// - [`TopologyError::Empty`] if no group is declared;
    /// - [`TopologyError::EmptyName`] / [`TopologyError::ReservedName`] for bad names;
    /// - [`TopologyError::Duplicate`] if a name is declared twice;
    /// - [`TopologyError::NoInstances`] if a group declares zero instances.
    pub fn new(specs: Vec<GroupSpec>) -> Result<Self, TopologyError> {
        if specs.is_empty() {
            return Err(TopologyError::Empty);
        }

        let mut groups: IndexMap<String, Group> = IndexMap::with_capacity(specs.len());
        let mut declared: Vec<(String, Vec<String>)> = Vec::with_capacity(specs.len());

        for spec in specs {
            if spec.name.is_empty() {
                return Err(TopologyError::EmptyName);
            }
            if spec.name == MAIN_POOL {
                return Err(TopologyError::ReservedName { name: spec.name });
            }
            if spec.instances == 0 {
                return Err(TopologyError::NoInstances { name: spec.name });
            }
            if groups.contains_key(&spec.name) {
                return Err(TopologyError::Duplicate { name: spec.name });
            }
            declared.push((spec.name.clone(), spec.peers));
            groups.insert(
                spec.name.clone(),
                Group {
                    name: spec.name,
                    instances: spec.instances,
                    entry: spec.entry,
                    peers: IndexSet::new(),
                    data: spec.data,
                },
            );
        }

        for (name, peers) in declared {
            for peer in peers {
                if !groups.contains_key(&peer) {
                    tracing::warn!(group = %name, peer = %peer, "dropping unknown peer group");
                    continue;
                }
                if let Some(g) = groups.get_mut(&name) {
                    g.peers.insert(peer.clone());
                }
                if let Some(p) = groups.get_mut(&peer) {
                    p.peers.insert(name.clone());
                }
            }
        }

        // Keep peer order stable: declaration order of the groups.
        let order: IndexMap<String, usize> = groups
            .keys()
            .enumerate()
            .map(|(i, k)| (k.clone(), i))
            .collect();
        let rank = |p: &String| order.get(p).copied().unwrap_or(usize::MAX);
        for group in groups.values_mut() {
            group.peers.sort_by(|a, b| rank(a).cmp(&rank(b)));
        }

        Ok(Self { groups })
    }

    /// Looks up a group by name.
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// Groups in declaration order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Every declared instance, in declaration order.
    pub fn addressees(&self) -> Vec<Addressee> {
        self.groups.values().flat_map(Group::addressees).collect()
    }

    /// Total number of declared instances.
    pub fn unit_count(&self) -> usize {
        self.groups.values().map(|g| g.instances as usize).sum()
    }

    /// All unordered instance pairs that need a dedicated Port.
    ///
    /// Each pair appears exactly once.
    pub fn links(&self) -> Vec<(Addressee, Addressee)> {
        let mut links = Vec::new();
        for (idx, group) in self.groups.values().enumerate() {
            if group.is_self_linked() {
                for i in 1..=group.instances {
                    for j in (i + 1)..=group.instances {
                        links.push((
                            Addressee::new(group.name.as_str(), i),
                            Addressee::new(group.name.as_str(), j),
                        ));
                    }
                }
            }
            for peer in &group.peers {
                let Some((peer_idx, _, other)) = self.groups.get_full(peer) else {
                    continue;
                };
                // Cross-group pairs are emitted once, from the earlier group.
                if peer_idx <= idx {
                    continue;
                }
                for a in group.addressees() {
                    for b in other.addressees() {
                        links.push((a.clone(), b));
                    }
                }
            }
        }
        links
    }

    /// Instances the given unit shares a Port with (self excluded).
    ///
    /// Returns an empty list for an unknown unit.
    pub fn peers_of(&self, unit: &Addressee) -> Vec<Addressee> {
        let Some(group) = self.groups.get(unit.name()) else {
            return Vec::new();
        };
        let mut peers = Vec::new();
        for name in &group.peers {
            let Some(other) = self.groups.get(name) else {
                continue;
            };
            peers.extend(other.addressees().filter(|a| a != unit));
        }
        peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::EntryFn;
    use crate::thread::Thread;

    fn entry() -> EntryRef {
        EntryFn::arc("noop", |_t: Thread| async move { Ok(()) })
    }

    #[test]
    fn test_peers_are_symmetrized() {
        let topo = Topology::new(vec![
            GroupSpec::new("a", entry()).instances(2).peer("b"),
            GroupSpec::new("b", entry()),
        ])
        .unwrap();

        let b = topo.group("b").unwrap();
        assert_eq!(b.peers().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(
            topo.peers_of(&Addressee::new("b", 1)),
            vec![Addressee::new("a", 1), Addressee::new("a", 2)]
        );
    }

    #[test]
    fn test_unknown_peer_is_dropped() {
        let topo = Topology::new(vec![GroupSpec::new("a", entry()).peer("ghost")]).unwrap();
        assert_eq!(topo.group("a").unwrap().peers().count(), 0);
        assert!(topo.links().is_empty());
    }

    #[test]
    fn test_self_linked_group_pairs_exclude_self() {
        let topo = Topology::new(vec![GroupSpec::new("w", entry()).instances(3).peer("w")]).unwrap();

        let links = topo.links();
        assert_eq!(links.len(), 3);
        assert!(links.iter().all(|(a, b)| a != b));
        assert_eq!(
            topo.peers_of(&Addressee::new("w", 2)),
            vec![Addressee::new("w", 1), Addressee::new("w", 3)]
        );
    }

    #[test]
    fn test_cross_links_emitted_once() {
        // Both sides declare each other; the pair must not be doubled.
        let topo = Topology::new(vec![
            GroupSpec::new("a", entry()).instances(2).peer("b"),
            GroupSpec::new("b", entry()).instances(3).peer("a"),
        ])
        .unwrap();
        assert_eq!(topo.links().len(), 6);
        assert_eq!(topo.unit_count(), 5);
    }

    #[test]
    fn test_rejects_invalid_declarations() {
        assert!(matches!(Topology::new(vec![]), Err(TopologyError::Empty)));
        assert!(matches!(
            Topology::new(vec![GroupSpec::new("main", entry())]),
            Err(TopologyError::ReservedName { .. })
        ));
        assert!(matches!(
            Topology::new(vec![GroupSpec::new("a", entry()).instances(0)]),
            Err(TopologyError::NoInstances { .. })
        ));
        assert!(matches!(
            Topology::new(vec![GroupSpec::new("a", entry()), GroupSpec::new("a", entry())]),
            Err(TopologyError::Duplicate { .. })
        ));
    }
}
