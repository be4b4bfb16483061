//! One partition of the property graph.

pub mod csr;
pub mod extension;
mod load;

pub use csr::Csr;
pub use extension::{AppendResult, ExtendedAdjacency, SlotId};

use crate::{
    error::{Error, Result},
    id_parser::IdParser,
    table::{AppendOnlyTable, Row, Schema, Table},
    types::{
        DataType, EId, ELabel, FId, Nbr, Oid, PropId, PropertyType, PropertyValue, VId, VLabel,
        Vertex,
    },
    vertex_map::IdentityMap,
};
use std::{convert::TryFrom, path::PathBuf, sync::Arc};

/// Where the CSR buffers of a fragment live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BufferType {
    Mem,
    /// Memory mapped files created inside the given directory.
    MmapMut(PathBuf),
}

impl Default for BufferType {
    fn default() -> Self {
        BufferType::Mem
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    buffer: BufferType,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(mut self, buffer: BufferType) -> Self {
        self.buffer = buffer;
        self
    }

    /// Spills CSR buffers into memory mapped files inside `dir`.
    pub fn spill_dir<P: Into<PathBuf>>(self, dir: P) -> Self {
        self.buffer(BufferType::MmapMut(dir.into()))
    }

    pub fn buffer_type(&self) -> &BufferType {
        &self.buffer
    }
}

/// The vertices and edges owned by one fragment, in an immutable base loaded
/// from the store and an append-only overlay filled by the appender.
///
/// Adjacency is indexed by `[vertex label][edge label]`. The incoming side is
/// only stored for directed graphs, an undirected fragment answers incoming
/// queries with its outgoing adjacency.
pub struct Fragment {
    fid: FId,
    directed: bool,
    identity: IdentityMap,
    vertex_schemas: Vec<Arc<Schema>>,
    edge_schemas: Vec<Arc<Schema>>,
    relations: Vec<(VLabel, VLabel)>,
    vertex_tables: Vec<Table>,
    edge_tables: Vec<Table>,
    extra_vertex_tables: Vec<AppendOnlyTable>,
    extra_edge_tables: Vec<AppendOnlyTable>,
    oe: Vec<Vec<Csr>>,
    ie: Vec<Vec<Csr>>,
    extra_oe: Vec<Vec<ExtendedAdjacency>>,
    extra_ie: Vec<Vec<ExtendedAdjacency>>,
}

impl Fragment {
    pub fn fid(&self) -> FId {
        self.fid
    }

    pub fn fnum(&self) -> usize {
        self.identity.id_parser().fnum()
    }

    pub fn directed(&self) -> bool {
        self.directed
    }

    pub fn id_parser(&self) -> &IdParser {
        self.identity.id_parser()
    }

    pub fn identity_map(&self) -> &IdentityMap {
        &self.identity
    }

    pub fn vertex_label_count(&self) -> usize {
        self.vertex_schemas.len()
    }

    pub fn edge_label_count(&self) -> usize {
        self.edge_schemas.len()
    }

    pub fn vertex_schema(&self, label: VLabel) -> &Arc<Schema> {
        &self.vertex_schemas[label]
    }

    pub fn edge_schema(&self, label: ELabel) -> &Arc<Schema> {
        &self.edge_schemas[label]
    }

    /// The `(source label, destination label)` of the edges of `label`.
    pub fn edge_relation(&self, label: ELabel) -> (VLabel, VLabel) {
        self.relations[label]
    }

    pub fn inner_count(&self, label: VLabel) -> usize {
        self.identity.inner_count(label)
    }

    pub fn outer_count(&self, label: VLabel) -> usize {
        self.identity.outer_count(label)
    }

    /// The number of inner and outer vertices of `label`.
    pub fn vertex_count(&self, label: VLabel) -> usize {
        self.inner_count(label) + self.outer_count(label)
    }

    pub fn inner_vertices(&self, label: VLabel) -> impl Iterator<Item = Vertex> + '_ {
        let parser = *self.id_parser();
        (0..self.inner_count(label) as VId)
            .map(move |offset| Vertex::new(parser.generate_id(0, label, offset)))
    }

    pub fn outer_vertices(&self, label: VLabel) -> impl Iterator<Item = Vertex> + '_ {
        (0..self.outer_count(label))
            .map(move |index| Vertex::new(self.identity.outer_lid(label, index)))
    }

    /// Inner vertices followed by outer vertices.
    pub fn vertices(&self, label: VLabel) -> impl Iterator<Item = Vertex> + '_ {
        self.inner_vertices(label).chain(self.outer_vertices(label))
    }

    pub fn is_inner(&self, v: Vertex) -> bool {
        self.identity.is_inner(v.lid())
    }

    pub fn is_outer(&self, v: Vertex) -> bool {
        self.identity.is_outer(v.lid())
    }

    pub fn vertex_label(&self, v: Vertex) -> VLabel {
        self.id_parser().get_label(v.lid())
    }

    pub fn vertex_offset(&self, v: Vertex) -> VId {
        self.id_parser().get_offset(v.lid())
    }

    pub fn gid(&self, v: Vertex) -> Option<VId> {
        self.identity.lid_to_gid(v.lid())
    }

    /// The original id of an inner or outer vertex.
    pub fn get_id(&self, v: Vertex) -> Option<Oid> {
        self.identity.resolve_to_oid(self.gid(v)?)
    }

    pub fn vertex_for_oid(&self, label: VLabel, oid: Oid) -> Option<Vertex> {
        let gid = self.identity.get_gid(label, oid)?;
        self.identity.resolve_to_local(gid).map(Vertex::new)
    }

    /// The load-time out-neighbors of `v` sorted by neighbor id.
    pub fn outgoing_adjacency(&self, v: Vertex, label: ELabel) -> &[Nbr] {
        base_adjacency(&self.identity, &self.oe, v.lid(), label)
    }

    pub fn incoming_adjacency(&self, v: Vertex, label: ELabel) -> &[Nbr] {
        if self.directed {
            base_adjacency(&self.identity, &self.ie, v.lid(), label)
        } else {
            self.outgoing_adjacency(v, label)
        }
    }

    fn extended_row<'a>(
        &self,
        extensions: &'a [Vec<ExtendedAdjacency>],
        v: Vertex,
        label: ELabel,
    ) -> &'a [Nbr] {
        match extensions
            .get(self.vertex_label(v))
            .and_then(|extensions| extensions.get(label))
        {
            Some(extension) => extension.get(v.lid()),
            None => &[],
        }
    }

    /// The out-neighbors appended to `v` after load, in insertion order.
    pub fn extended_outgoing_adjacency(&self, v: Vertex, label: ELabel) -> &[Nbr] {
        self.extended_row(&self.extra_oe, v, label)
    }

    pub fn extended_incoming_adjacency(&self, v: Vertex, label: ELabel) -> &[Nbr] {
        if self.directed {
            self.extended_row(&self.extra_ie, v, label)
        } else {
            self.extended_outgoing_adjacency(v, label)
        }
    }

    pub fn extended_outgoing(&self, vlabel: VLabel, elabel: ELabel) -> &ExtendedAdjacency {
        &self.extra_oe[vlabel][elabel]
    }

    pub fn extended_incoming(&self, vlabel: VLabel, elabel: ELabel) -> &ExtendedAdjacency {
        if self.directed {
            &self.extra_ie[vlabel][elabel]
        } else {
            &self.extra_oe[vlabel][elabel]
        }
    }

    /// Returns the property `prop` of an inner vertex, `None` for outer
    /// vertices and unknown columns.
    pub fn property(&self, v: Vertex, prop: PropId) -> Option<PropertyValue> {
        if !self.is_inner(v) {
            return None;
        }
        let label = self.vertex_label(v);
        let offset = self.vertex_offset(v) as usize;
        let base = self.identity.base_inner_count(label);
        if offset < base {
            self.vertex_tables[label].get(prop, offset)
        } else {
            self.extra_vertex_tables[label].get(prop, offset - base)
        }
    }

    pub fn get_property<T: PropertyType>(&self, v: Vertex, prop: PropId) -> Result<Option<T>> {
        self.property(v, prop).map(convert::<T>).transpose()
    }

    /// The number of edge rows of `label`, load time and appended.
    pub fn edge_count(&self, label: ELabel) -> usize {
        self.edge_tables[label].row_count() + self.extra_edge_tables[label].row_count()
    }

    pub fn edge_property(&self, label: ELabel, eid: EId, prop: PropId) -> Option<PropertyValue> {
        let eid = eid as usize;
        let base = self.edge_tables.get(label)?;
        if eid < base.row_count() {
            base.get(prop, eid)
        } else {
            self.extra_edge_tables[label].get(prop, eid - base.row_count())
        }
    }

    pub fn get_edge_property<T: PropertyType>(
        &self,
        label: ELabel,
        eid: EId,
        prop: PropId,
    ) -> Result<Option<T>> {
        self.edge_property(label, eid, prop)
            .map(convert::<T>)
            .transpose()
    }

    pub(crate) fn identity_map_mut(&mut self) -> &mut IdentityMap {
        &mut self.identity
    }

    /// Appends the row of a vertex that was just added to this fragment.
    pub(crate) fn append_vertex_row(&mut self, label: VLabel, row: &Row) -> Result<usize> {
        self.extra_vertex_tables[label].append_row(row)
    }

    /// The edge id the next appended edge row of `label` receives.
    pub(crate) fn next_edge_id(&self, label: ELabel) -> EId {
        self.edge_count(label) as EId
    }

    pub(crate) fn append_edge_row(&mut self, label: ELabel, row: &Row) -> Result<EId> {
        let base = self.edge_tables[label].row_count();
        Ok((base + self.extra_edge_tables[label].append_row(row)?) as EId)
    }

    /// Appends `source -> destination` to the outgoing extension of `source`.
    pub(crate) fn append_outgoing(
        &mut self,
        label: ELabel,
        source: VId,
        destination: VId,
        eid: EId,
    ) -> AppendResult {
        let vlabel = self.id_parser().get_label(source);
        let base = base_adjacency(&self.identity, &self.oe, source, label);
        self.extra_oe[vlabel][label].append(base, source, destination, eid)
    }

    /// Appends `source -> destination` to the incoming side of `destination`,
    /// i.e. the incoming extension when directed and the outgoing extension
    /// (as `destination -> source`) otherwise.
    pub(crate) fn append_incoming(
        &mut self,
        label: ELabel,
        destination: VId,
        source: VId,
        eid: EId,
    ) -> AppendResult {
        let vlabel = self.id_parser().get_label(destination);
        let (csrs, extensions) = if self.directed {
            (&self.ie, &mut self.extra_ie)
        } else {
            (&self.oe, &mut self.extra_oe)
        };
        let base = base_adjacency(&self.identity, csrs, destination, label);
        extensions[vlabel][label].append(base, destination, source, eid)
    }

    pub(crate) fn check_vertex_label(&self, label: VLabel) -> Result<()> {
        if label < self.vertex_label_count() {
            Ok(())
        } else {
            Err(Error::InvalidLabel(label))
        }
    }

    pub(crate) fn check_edge_label(&self, label: ELabel) -> Result<()> {
        if label < self.edge_label_count() {
            Ok(())
        } else {
            Err(Error::InvalidLabel(label))
        }
    }
}

/// The CSR row of an inner vertex, empty for every other vertex.
fn base_adjacency<'a>(
    identity: &IdentityMap,
    csrs: &'a [Vec<Csr>],
    lid: VId,
    label: ELabel,
) -> &'a [Nbr] {
    if !identity.is_inner(lid) {
        return &[];
    }
    let (_, vlabel, offset) = identity.id_parser().parse(lid);
    match csrs.get(vlabel).and_then(|csrs| csrs.get(label)) {
        Some(csr) => csr.adjacency(offset),
        None => &[],
    }
}

fn convert<T: PropertyType>(value: PropertyValue) -> Result<T> {
    T::try_from(value).map_err(|found: DataType| Error::PropertyTypeMismatch {
        expected: T::DATA_TYPE,
        found,
    })
}
