use crate::{
    fragment::csr::contains,
    types::{EId, Nbr, VId},
};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendResult {
    Inserted,
    AlreadyPresent,
}

/// A stable handle of one adjacency list in an [`ExtendedAdjacency`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(usize);

/// The edges appended to one source vertex, in insertion order.
#[derive(Debug, Default)]
pub struct AdjList {
    nbrs: Vec<Nbr>,
    positions: HashMap<VId, usize>,
}

impl AdjList {
    pub fn nbrs(&self) -> &[Nbr] {
        &self.nbrs
    }

    pub fn len(&self) -> usize {
        self.nbrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nbrs.is_empty()
    }

    pub fn get(&self, neighbor: VId) -> Option<EId> {
        self.positions.get(&neighbor).map(|&pos| self.nbrs[pos].eid)
    }

    fn insert(&mut self, neighbor: VId, eid: EId) -> AppendResult {
        if self.positions.contains_key(&neighbor) {
            return AppendResult::AlreadyPresent;
        }
        self.positions.insert(neighbor, self.nbrs.len());
        self.nbrs.push(Nbr::new(neighbor, eid));
        AppendResult::Inserted
    }
}

/// Edges added after load for one `(vertex label, edge label, direction)`.
///
/// Lists live in an arena of boxes that only grows, so a [`SlotId`] handed
/// out once stays valid for the life of the structure.
#[derive(Debug, Default)]
pub struct ExtendedAdjacency {
    slots: HashMap<VId, SlotId>,
    lists: Vec<Box<AdjList>>,
    num_edges: usize,
}

impl ExtendedAdjacency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `source -> destination` unless `destination` is already a
    /// neighbor of `source` in `base` (the sorted immutable adjacency of
    /// `source`) or in this extension.
    pub fn append(&mut self, base: &[Nbr], source: VId, destination: VId, eid: EId) -> AppendResult {
        if contains(base, destination) {
            return AppendResult::AlreadyPresent;
        }
        let slot = self.slot_or_insert(source);
        let result = self.lists[slot.0].insert(destination, eid);
        if result == AppendResult::Inserted {
            self.num_edges += 1;
        }
        result
    }

    /// Returns the appended neighbors of `source` in insertion order.
    pub fn get(&self, source: VId) -> &[Nbr] {
        match self.slot(source) {
            Some(slot) => self.list(slot).nbrs(),
            None => &[],
        }
    }

    pub fn contains(&self, source: VId, destination: VId) -> bool {
        self.slot(source)
            .map_or(false, |slot| self.list(slot).get(destination).is_some())
    }

    pub fn slot(&self, source: VId) -> Option<SlotId> {
        self.slots.get(&source).copied()
    }

    pub fn list(&self, slot: SlotId) -> &AdjList {
        &self.lists[slot.0]
    }

    /// The number of sources with at least one appended edge.
    pub fn num_sources(&self) -> usize {
        self.lists.len()
    }

    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    fn slot_or_insert(&mut self, source: VId) -> SlotId {
        let lists = &mut self.lists;
        *self.slots.entry(source).or_insert_with(|| {
            lists.push(Box::new(AdjList::default()));
            SlotId(lists.len() - 1)
        })
    }
}
