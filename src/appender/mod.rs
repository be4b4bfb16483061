//! Batched ingestion of new vertices and edges into every fragment.

pub mod parse;

use crate::{
    comm::Communicator,
    error::{Error, Result},
    fragment::{AppendResult, Fragment},
    partitioner::HashPartitioner,
    table::{Row, Schema},
    types::{ELabel, FId, Oid, VId, VLabel},
};
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};

type VertexRows = Vec<(Oid, Row)>;
type EdgeRows = Vec<(Oid, Oid, Row)>;

/// The parsed rows of one batch, identical on every fragment after the
/// broadcast.
#[derive(Clone, Debug, Default)]
struct Batch {
    vertices: BTreeMap<VLabel, VertexRows>,
    edges: BTreeMap<ELabel, EdgeRows>,
}

impl Batch {
    fn concat(parts: Vec<Batch>) -> Self {
        let mut batch = Batch::default();
        for part in parts {
            for (label, rows) in part.vertices {
                batch.vertices.entry(label).or_default().extend(rows);
            }
            for (label, rows) in part.edges {
                batch.edges.entry(label).or_default().extend(rows);
            }
        }
        batch
    }

    fn num_vertices(&self) -> usize {
        self.vertices.values().map(Vec::len).sum()
    }

    fn num_edges(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }
}

/// An edge of the batch with at least one endpoint in this fragment.
struct LocalEdge<'b> {
    label: ELabel,
    source: VId,
    destination: VId,
    source_is_inner: bool,
    destination_is_inner: bool,
    row: &'b Row,
}

/// Applies batches of textual records to one fragment.
///
/// Every fragment of the cluster runs its appender on the same batch at the
/// same time, each stage ending at a barrier of the communicator.
pub struct Appender<'a, C: Communicator> {
    fragment: &'a mut Fragment,
    comm: &'a C,
    partitioner: HashPartitioner,
}

impl<'a, C: Communicator> Appender<'a, C> {
    pub fn new(fragment: &'a mut Fragment, comm: &'a C) -> Self {
        assert_eq!(fragment.fid(), comm.fid(), "fragment and communicator differ");
        assert_eq!(fragment.fnum(), comm.fnum(), "fragment and communicator differ");
        let partitioner = HashPartitioner::new(fragment.fnum());
        Self {
            fragment,
            comm,
            partitioner,
        }
    }

    fn fid(&self) -> FId {
        self.fragment.fid()
    }

    /// Ingests one batch and returns the number of edges it added to the
    /// cluster.
    ///
    /// `vertex_lines[label]` holds `oid,properties...` lines and
    /// `edge_lines[label]` holds `src_oid,dst_oid,properties...` lines. With
    /// `header_row` the first line of every label is a header checked
    /// against the label's schema. Each fragment parses its own share of the
    /// lines, so all fragments must be handed the same input.
    pub fn extend(
        &mut self,
        vertex_lines: &BTreeMap<VLabel, Vec<String>>,
        edge_lines: &BTreeMap<ELabel, Vec<String>>,
        header_row: bool,
        delimiter: char,
        directed: bool,
    ) -> Result<usize> {
        let collected = self.collect(vertex_lines, edge_lines, header_row, delimiter, directed);
        self.comm.barrier();
        let batch = self.broadcast(collected)?;
        self.comm.barrier();
        info!(
            "fragment {}: batch of {} vertices and {} edges",
            self.fid(),
            batch.num_vertices(),
            batch.num_edges()
        );
        let owned = self.resolve_vertices(&batch);
        self.comm.barrier();
        let appended = owned.and_then(|owned| self.append_vertex_rows(owned));
        self.comm.barrier();
        let edges = appended.and_then(|()| self.resolve_edges(&batch));
        self.comm.barrier();
        let inserted = edges.and_then(|edges| self.insert_edges(edges));
        self.comm.barrier();
        self.report(inserted)
    }

    fn collect(
        &self,
        vertex_lines: &BTreeMap<VLabel, Vec<String>>,
        edge_lines: &BTreeMap<ELabel, Vec<String>>,
        header_row: bool,
        delimiter: char,
        directed: bool,
    ) -> Result<Batch> {
        if directed != self.fragment.directed() {
            return Err(Error::DirectednessMismatch {
                expected: self.fragment.directed(),
                found: directed,
            });
        }
        let mut batch = Batch::default();
        for (&label, lines) in vertex_lines {
            self.fragment.check_vertex_label(label)?;
            let schema = self.fragment.vertex_schema(label);
            let (lines, first_line) = self.share(lines, header_row, delimiter, 1, schema)?;
            let rows = parse::parse_vertex_lines(lines, delimiter, first_line, schema)?;
            debug!(
                "fragment {}: parsed {} vertices of label {}",
                self.fid(),
                rows.len(),
                label
            );
            batch.vertices.insert(label, rows);
        }
        for (&label, lines) in edge_lines {
            self.fragment.check_edge_label(label)?;
            let schema = self.fragment.edge_schema(label);
            let (lines, first_line) = self.share(lines, header_row, delimiter, 2, schema)?;
            let rows = parse::parse_edge_lines(lines, delimiter, first_line, schema)?;
            debug!(
                "fragment {}: parsed {} edges of label {}",
                self.fid(),
                rows.len(),
                label
            );
            batch.edges.insert(label, rows);
        }
        Ok(batch)
    }

    /// Checks the header and returns this fragment's contiguous chunk of the
    /// data lines together with the line number of its first line.
    fn share<'l>(
        &self,
        lines: &'l [String],
        header_row: bool,
        delimiter: char,
        key_columns: usize,
        schema: &Schema,
    ) -> Result<(&'l [String], usize)> {
        let data = if header_row {
            match lines.split_first() {
                Some((header, data)) => {
                    parse::check_header(header, delimiter, key_columns, schema)?;
                    data
                }
                None => lines,
            }
        } else {
            lines
        };
        let fnum = self.comm.fnum();
        let chunk = (data.len() + fnum - 1) / fnum;
        let begin = std::cmp::min(self.fid() * chunk, data.len());
        let end = std::cmp::min(begin + chunk, data.len());
        Ok((&data[begin..end], 1 + header_row as usize + begin))
    }

    /// Exchanges the parsed rows so that every fragment sees the whole batch,
    /// or the first parse failure.
    fn broadcast(&self, collected: Result<Batch>) -> Result<Batch> {
        let (local, error) = match collected {
            Ok(batch) => (Ok(batch), None),
            Err(e) => (Err(e.to_string()), Some(e)),
        };
        let parts = self.comm.all_gather(local);
        if let Some(e) = error {
            return Err(e);
        }
        parts
            .into_iter()
            .enumerate()
            .map(|(fid, part)| part.map_err(|message| Error::Batch { fid, message }))
            .collect::<Result<Vec<_>>>()
            .map(Batch::concat)
    }

    /// Checks every vertex label and edge endpoint of the batch, then assigns
    /// ids to the vertices not known yet.
    ///
    /// Returns the rows of the new vertices owned by this fragment in arrival
    /// order.
    fn resolve_vertices<'b>(&mut self, batch: &'b Batch) -> Result<Vec<(VLabel, VId, &'b Row)>> {
        let identity = self.fragment.identity_map();
        let mut pending: HashMap<Oid, VLabel> = HashMap::new();
        for (&label, rows) in &batch.vertices {
            for (oid, _) in rows {
                let found = identity
                    .find(*oid)
                    .map(|(found, _)| found)
                    .or_else(|| pending.get(oid).copied());
                match found {
                    Some(found) if found != label => {
                        return Err(Error::LabelMismatch {
                            oid: *oid,
                            expected: label,
                            found,
                        })
                    }
                    Some(_) => {}
                    None => {
                        pending.insert(*oid, label);
                    }
                }
            }
        }
        for (&label, rows) in &batch.edges {
            let (src_label, dst_label) = self.fragment.edge_relation(label);
            for (src, dst, _) in rows {
                for &(oid, expected) in &[(*src, src_label), (*dst, dst_label)] {
                    let found = identity
                        .find(oid)
                        .map(|(found, _)| found)
                        .or_else(|| pending.get(&oid).copied());
                    match found {
                        Some(found) if found != expected => {
                            return Err(Error::LabelMismatch {
                                oid,
                                expected,
                                found,
                            })
                        }
                        Some(_) => {}
                        None => return Err(Error::UnresolvedEndpoint { elabel: label, oid }),
                    }
                }
            }
        }
        let fid = self.fid();
        let partitioner = self.partitioner;
        let identity = self.fragment.identity_map_mut();
        let mut owned = vec![];
        for (&label, rows) in &batch.vertices {
            for (oid, row) in rows {
                if identity.get_gid(label, *oid).is_some() {
                    continue;
                }
                let owner = partitioner.partition(*oid);
                let gid = identity.add_new(owner, label, *oid);
                if owner == fid {
                    owned.push((label, gid, row));
                }
            }
        }
        debug!("fragment {}: {} new inner vertices", fid, owned.len());
        Ok(owned)
    }

    fn append_vertex_rows(&mut self, owned: Vec<(VLabel, VId, &Row)>) -> Result<()> {
        for (label, gid, row) in owned {
            let index = self.fragment.append_vertex_row(label, row)?;
            debug_assert_eq!(
                index + self.fragment.identity_map().base_inner_count(label),
                self.fragment.id_parser().get_offset(gid) as usize
            );
        }
        Ok(())
    }

    /// Resolves the endpoints of the edges touching this fragment, adding
    /// remote endpoints as outer vertices.
    fn resolve_edges<'b>(&mut self, batch: &'b Batch) -> Result<Vec<LocalEdge<'b>>> {
        let fid = self.fid();
        let mut edges = vec![];
        for (&label, rows) in &batch.edges {
            let (src_label, dst_label) = self.fragment.edge_relation(label);
            for (src, dst, row) in rows {
                let identity = self.fragment.identity_map_mut();
                let resolve = |oid, vlabel| {
                    identity
                        .get_gid(vlabel, oid)
                        .ok_or(Error::UnresolvedEndpoint { elabel: label, oid })
                };
                let (src_gid, dst_gid) = (resolve(*src, src_label)?, resolve(*dst, dst_label)?);
                let parser = *identity.id_parser();
                let source_is_inner = parser.get_fid(src_gid) == fid;
                let destination_is_inner = parser.get_fid(dst_gid) == fid;
                if !source_is_inner && !destination_is_inner {
                    continue;
                }
                let mut local = |gid, inner| {
                    if inner {
                        parser.lid(gid)
                    } else {
                        identity.add_outer(gid)
                    }
                };
                let source = local(src_gid, source_is_inner);
                let destination = local(dst_gid, destination_is_inner);
                edges.push(LocalEdge {
                    label,
                    source,
                    destination,
                    source_is_inner,
                    destination_is_inner,
                    row,
                });
            }
        }
        debug!("fragment {}: {} local edges", fid, edges.len());
        Ok(edges)
    }

    /// Inserts the local edges and returns how many this fragment added as
    /// the owner of their source.
    fn insert_edges(&mut self, edges: Vec<LocalEdge>) -> Result<usize> {
        let mut count = 0;
        for edge in edges {
            let eid = self.fragment.next_edge_id(edge.label);
            if edge.source_is_inner {
                let result =
                    self.fragment
                        .append_outgoing(edge.label, edge.source, edge.destination, eid);
                if result == AppendResult::Inserted {
                    self.fragment.append_edge_row(edge.label, edge.row)?;
                    count += 1;
                    if edge.destination_is_inner {
                        self.fragment.append_incoming(
                            edge.label,
                            edge.destination,
                            edge.source,
                            eid,
                        );
                    }
                }
            } else if self.fragment.append_incoming(
                edge.label,
                edge.destination,
                edge.source,
                eid,
            ) == AppendResult::Inserted
            {
                self.fragment.append_edge_row(edge.label, edge.row)?;
            }
        }
        info!("fragment {}: {} edges inserted", self.fid(), count);
        Ok(count)
    }

    /// Agrees on the outcome of the batch and sums the inserted edges.
    fn report(&self, inserted: Result<usize>) -> Result<usize> {
        let (local, error) = match inserted {
            Ok(count) => (Ok(count), None),
            Err(e) => (Err(e.to_string()), Some(e)),
        };
        let statuses = self.comm.all_gather(local);
        if let Some(e) = error {
            return Err(e);
        }
        let mut count = 0;
        for (fid, status) in statuses.into_iter().enumerate() {
            match status {
                Ok(n) if fid == self.fid() => count = n,
                Ok(_) => {}
                Err(message) => return Err(Error::Batch { fid, message }),
            }
        }
        Ok(self.comm.sum(count))
    }
}
