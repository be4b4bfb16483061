//! Mapping between original vertex ids, global ids and local ids.

use crate::{
    id_parser::IdParser,
    types::{FId, Oid, VId, VLabel},
};
use std::{collections::HashMap, sync::Arc};

/// The cluster-wide `oid <-> gid` map of the vertices known at load time.
///
/// It is built once and shared read-only by every fragment of a process.
#[derive(Debug)]
pub struct VertexMap {
    id_parser: IdParser,
    oids: Vec<Vec<Vec<Oid>>>,
    o2g: Vec<HashMap<Oid, VId>>,
}

impl VertexMap {
    /// Creates the map from `oids[fid][label][offset]`.
    pub fn new(id_parser: IdParser, oids: Vec<Vec<Vec<Oid>>>) -> Self {
        assert_eq!(oids.len(), id_parser.fnum());
        let mut o2g = vec![HashMap::new(); id_parser.label_num()];
        for (fid, labels) in oids.iter().enumerate() {
            assert_eq!(labels.len(), id_parser.label_num());
            for (label, label_oids) in labels.iter().enumerate() {
                for (offset, &oid) in label_oids.iter().enumerate() {
                    o2g[label].insert(oid, id_parser.generate_id(fid, label, offset as VId));
                }
            }
        }
        Self {
            id_parser,
            oids,
            o2g,
        }
    }

    pub fn id_parser(&self) -> &IdParser {
        &self.id_parser
    }

    pub fn fnum(&self) -> usize {
        self.id_parser.fnum()
    }

    pub fn label_num(&self) -> usize {
        self.id_parser.label_num()
    }

    pub fn inner_count(&self, fid: FId, label: VLabel) -> usize {
        self.oids[fid][label].len()
    }

    pub fn oids(&self, fid: FId, label: VLabel) -> &[Oid] {
        &self.oids[fid][label]
    }

    pub fn get_gid(&self, label: VLabel, oid: Oid) -> Option<VId> {
        self.o2g.get(label)?.get(&oid).copied()
    }

    pub fn get_oid(&self, gid: VId) -> Option<Oid> {
        let (fid, label, offset) = self.id_parser.parse(gid);
        self.oids
            .get(fid)?
            .get(label)?
            .get(offset as usize)
            .copied()
    }
}

/// Vertices discovered after load, numbered right after the load-time
/// vertices of their `(fid, label)`.
#[derive(Debug)]
pub struct ExtraVertexMap {
    id_parser: IdParser,
    base_counts: Vec<Vec<usize>>,
    oids: Vec<Vec<Vec<Oid>>>,
    o2g: Vec<HashMap<Oid, VId>>,
}

impl ExtraVertexMap {
    pub fn new(base: &VertexMap) -> Self {
        let (fnum, label_num) = (base.fnum(), base.label_num());
        Self {
            id_parser: *base.id_parser(),
            base_counts: (0..fnum)
                .map(|fid| (0..label_num).map(|l| base.inner_count(fid, l)).collect())
                .collect(),
            oids: vec![vec![vec![]; label_num]; fnum],
            o2g: vec![HashMap::new(); label_num],
        }
    }

    pub fn count(&self, fid: FId, label: VLabel) -> usize {
        self.oids[fid][label].len()
    }

    pub fn get_gid(&self, label: VLabel, oid: Oid) -> Option<VId> {
        self.o2g.get(label)?.get(&oid).copied()
    }

    pub fn get_oid(&self, gid: VId) -> Option<Oid> {
        let (fid, label, offset) = self.id_parser.parse(gid);
        let base = *self.base_counts.get(fid)?.get(label)? as VId;
        let index = offset.checked_sub(base)? as usize;
        self.oids[fid][label].get(index).copied()
    }

    /// Assigns the next offset of `(fid, label)` to `oid`.
    ///
    /// `oid` must not be known yet under `label`.
    pub fn add(&mut self, fid: FId, label: VLabel, oid: Oid) -> VId {
        let offset = self.base_counts[fid][label] + self.oids[fid][label].len();
        let gid = self.id_parser.generate_id(fid, label, offset as VId);
        let previous = self.o2g[label].insert(oid, gid);
        debug_assert!(previous.is_none(), "oid {} added twice", oid);
        self.oids[fid][label].push(oid);
        gid
    }
}

/// The identity map of one fragment.
///
/// Oids resolve through the shared load-time [`VertexMap`] first and the
/// fragment's [`ExtraVertexMap`] second. Outer vertices (mirrors of remote
/// vertices referenced by local edges) get local ids counting down from the
/// largest offset, resolved through the load-time outer map first and the
/// outer map of later batches second.
#[derive(Debug)]
pub struct IdentityMap {
    fid: FId,
    id_parser: IdParser,
    base: Arc<VertexMap>,
    extra: ExtraVertexMap,
    outer_gids: Vec<Vec<VId>>,
    base_ovg2l: Vec<HashMap<VId, VId>>,
    extra_ovg2l: Vec<HashMap<VId, VId>>,
}

impl IdentityMap {
    /// `outer_gids[label][i]` is the gid of the `i`-th outer vertex of `label`.
    pub fn new(fid: FId, base: Arc<VertexMap>, outer_gids: Vec<Vec<VId>>) -> Self {
        let id_parser = *base.id_parser();
        assert!(fid < id_parser.fnum());
        assert_eq!(outer_gids.len(), id_parser.label_num());
        let base_ovg2l = outer_gids
            .iter()
            .enumerate()
            .map(|(label, gids)| {
                gids.iter()
                    .enumerate()
                    .map(|(index, &gid)| (gid, outer_lid(&id_parser, label, index)))
                    .collect()
            })
            .collect();
        Self {
            fid,
            id_parser,
            extra: ExtraVertexMap::new(&base),
            base,
            outer_gids,
            base_ovg2l,
            extra_ovg2l: vec![HashMap::new(); id_parser.label_num()],
        }
    }

    pub fn fid(&self) -> FId {
        self.fid
    }

    pub fn id_parser(&self) -> &IdParser {
        &self.id_parser
    }

    pub fn base(&self) -> &Arc<VertexMap> {
        &self.base
    }

    /// The number of vertices of `label` owned by `fid`, load time and later.
    pub fn vertex_count(&self, fid: FId, label: VLabel) -> usize {
        self.base.inner_count(fid, label) + self.extra.count(fid, label)
    }

    pub fn inner_count(&self, label: VLabel) -> usize {
        self.vertex_count(self.fid, label)
    }

    pub fn base_inner_count(&self, label: VLabel) -> usize {
        self.base.inner_count(self.fid, label)
    }

    pub fn outer_count(&self, label: VLabel) -> usize {
        self.outer_gids[label].len()
    }

    pub fn get_gid(&self, label: VLabel, oid: Oid) -> Option<VId> {
        self.base
            .get_gid(label, oid)
            .or_else(|| self.extra.get_gid(label, oid))
    }

    /// Looks `oid` up under every label.
    pub fn find(&self, oid: Oid) -> Option<(VLabel, VId)> {
        (0..self.id_parser.label_num())
            .find_map(|label| self.get_gid(label, oid).map(|gid| (label, gid)))
    }

    pub fn resolve_to_oid(&self, gid: VId) -> Option<Oid> {
        let (fid, label, offset) = self.id_parser.parse(gid);
        if fid >= self.id_parser.fnum() || label >= self.id_parser.label_num() {
            return None;
        }
        if (offset as usize) < self.base.inner_count(fid, label) {
            self.base.get_oid(gid)
        } else {
            self.extra.get_oid(gid)
        }
    }

    /// Registers `oid` as a new vertex of `label` owned by `fid`.
    ///
    /// Callers must check [`get_gid`](IdentityMap::get_gid) first.
    pub fn add_new(&mut self, fid: FId, label: VLabel, oid: Oid) -> VId {
        debug_assert!(self.get_gid(label, oid).is_none());
        self.extra.add(fid, label, oid)
    }

    pub fn resolve_to_local(&self, gid: VId) -> Option<VId> {
        let (fid, label, offset) = self.id_parser.parse(gid);
        if label >= self.id_parser.label_num() {
            return None;
        }
        if fid == self.fid {
            if (offset as usize) < self.inner_count(label) {
                Some(self.id_parser.lid(gid))
            } else {
                None
            }
        } else {
            self.base_ovg2l[label]
                .get(&gid)
                .or_else(|| self.extra_ovg2l[label].get(&gid))
                .copied()
        }
    }

    /// Returns the outer local id of the remote vertex `gid`, registering it
    /// on first use.
    pub fn add_outer(&mut self, gid: VId) -> VId {
        debug_assert_ne!(self.id_parser.get_fid(gid), self.fid);
        if let Some(lid) = self.resolve_to_local(gid) {
            return lid;
        }
        let label = self.id_parser.get_label(gid);
        let lid = outer_lid(&self.id_parser, label, self.outer_gids[label].len());
        assert!(
            self.id_parser.get_offset(lid) as usize >= self.inner_count(label),
            "outer vertices of label {} collide with inner vertices",
            label
        );
        self.outer_gids[label].push(gid);
        self.extra_ovg2l[label].insert(gid, lid);
        lid
    }

    pub fn is_inner(&self, lid: VId) -> bool {
        let (_, label, offset) = self.id_parser.parse(lid);
        label < self.id_parser.label_num() && (offset as usize) < self.inner_count(label)
    }

    /// The position of an outer vertex among the outer vertices of its label.
    pub fn outer_index(&self, lid: VId) -> Option<usize> {
        let (_, label, offset) = self.id_parser.parse(lid);
        if label >= self.id_parser.label_num() {
            return None;
        }
        let index = (self.id_parser.max_offset() - offset) as usize;
        if index < self.outer_count(label) {
            Some(index)
        } else {
            None
        }
    }

    pub fn is_outer(&self, lid: VId) -> bool {
        self.outer_index(lid).is_some()
    }

    pub fn lid_to_gid(&self, lid: VId) -> Option<VId> {
        if self.is_inner(lid) {
            Some(self.id_parser.gid(self.fid, lid))
        } else {
            let index = self.outer_index(lid)?;
            Some(self.outer_gids[self.id_parser.get_label(lid)][index])
        }
    }

    pub fn outer_lid(&self, label: VLabel, index: usize) -> VId {
        outer_lid(&self.id_parser, label, index)
    }
}

fn outer_lid(id_parser: &IdParser, label: VLabel, index: usize) -> VId {
    id_parser.generate_id(0, label, id_parser.max_offset() - index as VId)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two fragments, two labels.
    fn create_vertex_map() -> Arc<VertexMap> {
        Arc::new(VertexMap::new(
            IdParser::new(2, 2),
            vec![vec![vec![10, 12], vec![20]], vec![vec![11, 13], vec![]]],
        ))
    }

    #[test]
    fn test_vertex_map() {
        let vm = create_vertex_map();
        let parser = *vm.id_parser();
        assert_eq!(vm.get_gid(0, 13), Some(parser.generate_id(1, 0, 1)));
        assert_eq!(vm.get_gid(1, 13), None);
        assert_eq!(vm.get_oid(parser.generate_id(0, 1, 0)), Some(20));
        assert_eq!(vm.get_oid(parser.generate_id(1, 1, 0)), None);
        assert_eq!(vm.inner_count(0, 0), 2);
    }

    #[test]
    fn test_add_new_continues_after_base() {
        let mut map = IdentityMap::new(0, create_vertex_map(), vec![vec![], vec![]]);
        let parser = *map.id_parser();
        let gid = map.add_new(1, 0, 100);
        assert_eq!(parser.parse(gid), (1, 0, 2));
        assert_eq!(map.add_new(1, 0, 101), parser.generate_id(1, 0, 3));
        assert_eq!(map.add_new(0, 1, 102), parser.generate_id(0, 1, 1));
        assert_eq!(map.get_gid(0, 100), Some(gid));
        assert_eq!(map.find(102), Some((1, parser.generate_id(0, 1, 1))));
        assert_eq!(map.resolve_to_oid(gid), Some(100));
        assert_eq!(map.resolve_to_oid(parser.generate_id(1, 0, 1)), Some(13));
        assert_eq!(map.resolve_to_oid(parser.generate_id(1, 0, 4)), None);
        assert_eq!(map.vertex_count(1, 0), 4);
        assert_eq!(map.inner_count(1), 2);
    }

    #[test]
    fn test_identity_monotonicity() {
        let mut map = IdentityMap::new(1, create_vertex_map(), vec![vec![], vec![]]);
        let mut seen = std::collections::HashSet::new();
        for oid in 1000..1100 {
            let gid = map.add_new((oid % 2) as FId, 0, oid);
            assert!(seen.insert(gid));
            if map.id_parser().get_fid(gid) == 1 {
                let lid = map.resolve_to_local(gid).unwrap();
                assert_eq!(map.id_parser().gid(1, lid), gid);
            }
        }
        for oid in 1000..1100 {
            let gid = map.get_gid(0, oid).unwrap();
            assert_eq!(map.resolve_to_oid(gid), Some(oid));
        }
    }

    #[test]
    fn test_inner_resolution() {
        let mut map = IdentityMap::new(0, create_vertex_map(), vec![vec![], vec![]]);
        let parser = *map.id_parser();
        let gid = parser.generate_id(0, 0, 1);
        assert_eq!(map.resolve_to_local(gid), Some(parser.generate_id(0, 0, 1)));
        assert_eq!(map.resolve_to_local(parser.generate_id(0, 0, 2)), None);
        let gid = map.add_new(0, 0, 50);
        assert_eq!(map.resolve_to_local(gid), Some(parser.lid(gid)));
        assert!(map.is_inner(parser.lid(gid)));
        assert_eq!(map.lid_to_gid(parser.lid(gid)), Some(gid));
    }

    #[test]
    fn test_outer_vertices() {
        let vm = create_vertex_map();
        let parser = *vm.id_parser();
        let remote = parser.generate_id(1, 0, 0);
        let mut map = IdentityMap::new(0, vm, vec![vec![remote], vec![]]);
        let max = parser.max_offset();
        assert_eq!(map.outer_count(0), 1);
        assert_eq!(
            map.resolve_to_local(remote),
            Some(parser.generate_id(0, 0, max))
        );
        let other = parser.generate_id(1, 0, 1);
        let lid = map.add_outer(other);
        assert_eq!(lid, parser.generate_id(0, 0, max - 1));
        assert_eq!(map.add_outer(other), lid);
        assert_eq!(map.add_outer(remote), parser.generate_id(0, 0, max));
        assert_eq!(map.outer_count(0), 2);
        assert_eq!(map.outer_index(lid), Some(1));
        assert!(map.is_outer(lid));
        assert!(!map.is_inner(lid));
        assert!(!map.is_outer(parser.generate_id(0, 0, max - 2)));
        assert_eq!(map.lid_to_gid(lid), Some(other));
        assert_eq!(map.resolve_to_oid(other), Some(13));
        assert_eq!(map.resolve_to_local(parser.generate_id(1, 1, 0)), None);
    }
}
