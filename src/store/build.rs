//! Partitioning raw vertex and edge rows into a store.

use super::{keys, Meta, Store};
use crate::{
    appender::parse,
    error::{Error, Result},
    fragment::Csr,
    id_parser::IdParser,
    partitioner::HashPartitioner,
    table::{Row, Schema},
    types::{FId, Nbr, Oid, VId, VLabel},
    vertex_map::VertexMap,
};
use log::{info, warn};
use rayon::prelude::*;
use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    sync::Arc,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildOptions {
    pub fnum: usize,
    pub directed: bool,
}

impl BuildOptions {
    pub fn new(fnum: usize) -> Self {
        Self {
            fnum,
            directed: true,
        }
    }

    pub fn directed(mut self, directed: bool) -> Self {
        self.directed = directed;
        self
    }
}

#[derive(Clone, Debug)]
pub struct VertexData {
    pub schema: Arc<Schema>,
    pub rows: Vec<(Oid, Row)>,
}

impl VertexData {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            rows: vec![],
        }
    }
}

#[derive(Clone, Debug)]
pub struct EdgeData {
    pub src_label: VLabel,
    pub dst_label: VLabel,
    pub schema: Arc<Schema>,
    pub rows: Vec<(Oid, Oid, Row)>,
}

impl EdgeData {
    pub fn new(src_label: VLabel, dst_label: VLabel, schema: Arc<Schema>) -> Self {
        Self {
            src_label,
            dst_label,
            schema,
            rows: vec![],
        }
    }
}

/// The whole input graph, vertex labels and edge labels numbered by position.
#[derive(Clone, Debug, Default)]
pub struct GraphData {
    pub vertices: Vec<VertexData>,
    pub edges: Vec<EdgeData>,
}

fn read_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    Ok(BufReader::new(File::open(path)?)
        .lines()
        .collect::<std::io::Result<Vec<_>>>()?)
}

impl GraphData {
    /// Reads a delimited vertex file whose header is `id,name:type,...`.
    pub fn read_vertices<P: AsRef<Path>>(path: P, delimiter: char) -> Result<VertexData> {
        let lines = read_lines(path)?;
        let (header, data) = lines.split_first().ok_or(Error::Parse {
            line: 1,
            message: String::from("missing header"),
        })?;
        let schema = Arc::new(parse::parse_typed_header(header, delimiter, 1)?);
        let rows = parse::parse_vertex_lines(data, delimiter, 2, &schema)?;
        Ok(VertexData { schema, rows })
    }

    /// Reads a delimited edge file whose header is `src,dst,name:type,...`.
    pub fn read_edges<P: AsRef<Path>>(
        path: P,
        delimiter: char,
        src_label: VLabel,
        dst_label: VLabel,
    ) -> Result<EdgeData> {
        let lines = read_lines(path)?;
        let (header, data) = lines.split_first().ok_or(Error::Parse {
            line: 1,
            message: String::from("missing header"),
        })?;
        let schema = Arc::new(parse::parse_typed_header(header, delimiter, 2)?);
        let rows = parse::parse_edge_lines(data, delimiter, 2, &schema)?;
        Ok(EdgeData {
            src_label,
            dst_label,
            schema,
            rows,
        })
    }
}

/// Everything written for one fragment.
struct FragmentData<'g> {
    vertex_rows: Vec<Vec<Row>>,
    outer_gids: Vec<Vec<VId>>,
    edge_rows: Vec<Vec<&'g Row>>,
    oe: Vec<Vec<Vec<u64>>>,
    ie: Vec<Vec<Vec<u64>>>,
}

/// Outer vertices of one fragment, numbered in order of first reference.
struct OuterMap {
    id_parser: IdParser,
    gids: Vec<Vec<VId>>,
    lids: HashMap<VId, VId>,
}

impl OuterMap {
    fn new(id_parser: IdParser) -> Self {
        Self {
            id_parser,
            gids: vec![vec![]; id_parser.label_num()],
            lids: HashMap::new(),
        }
    }

    fn lid(&mut self, gid: VId) -> VId {
        let (id_parser, gids) = (self.id_parser, &mut self.gids);
        *self.lids.entry(gid).or_insert_with(|| {
            let label = id_parser.get_label(gid);
            let offset = id_parser.max_offset() - gids[label].len() as VId;
            gids[label].push(gid);
            id_parser.generate_id(0, label, offset)
        })
    }
}

/// Partitions `data` into `options.fnum` fragments and writes them to `store`.
pub fn build(store: &Store, data: &GraphData, options: &BuildOptions) -> Result<()> {
    if data.vertices.is_empty() {
        return Err(Error::MissingObject(String::from("vertex labels")));
    }
    let meta = Meta {
        fnum: options.fnum,
        vertex_label_num: data.vertices.len(),
        edge_label_num: data.edges.len(),
        directed: options.directed,
    };
    for (label, edges) in data.edges.iter().enumerate() {
        if edges.src_label >= meta.vertex_label_num || edges.dst_label >= meta.vertex_label_num {
            return Err(Error::InvalidLabel(label));
        }
    }
    let id_parser = IdParser::new(meta.fnum, meta.vertex_label_num);
    let partitioner = HashPartitioner::new(meta.fnum);
    info!("partitioning vertices...");
    let mut oids = vec![vec![vec![]; meta.vertex_label_num]; meta.fnum];
    let mut vertex_rows = vec![vec![vec![]; meta.vertex_label_num]; meta.fnum];
    let mut seen = HashSet::new();
    for (label, vertices) in data.vertices.iter().enumerate() {
        for (oid, row) in &vertices.rows {
            if !seen.insert(*oid) {
                warn!("skipping duplicate vertex {}", oid);
                continue;
            }
            let fid = partitioner.partition(*oid);
            oids[fid][label].push(*oid);
            vertex_rows[fid][label].push(row.clone());
        }
    }
    let vertex_map = VertexMap::new(id_parser, oids);
    info!("building {} fragments...", meta.fnum);
    let fragments = vertex_rows
        .into_par_iter()
        .enumerate()
        .map(|(fid, rows)| build_fragment(&vertex_map, data, meta, fid, rows))
        .collect::<Result<Vec<_>>>()?;
    store.in_transaction(|store| {
        write_graph(store, data, meta, &vertex_map)?;
        for (fid, fragment) in fragments.iter().enumerate() {
            write_fragment(store, data, meta, fid, fragment)?;
        }
        Ok(())
    })?;
    info!("store built");
    Ok(())
}

fn build_fragment<'g>(
    vertex_map: &VertexMap,
    data: &'g GraphData,
    meta: Meta,
    fid: FId,
    vertex_rows: Vec<Vec<Row>>,
) -> Result<FragmentData<'g>> {
    let id_parser = *vertex_map.id_parser();
    let mut outer = OuterMap::new(id_parser);
    let mut edge_rows = Vec::with_capacity(meta.edge_label_num);
    let mut oe_entries = vec![vec![vec![]; meta.edge_label_num]; meta.vertex_label_num];
    let mut ie_entries = vec![vec![vec![]; meta.edge_label_num]; meta.vertex_label_num];
    for (elabel, edges) in data.edges.iter().enumerate() {
        let mut rows = vec![];
        for (src, dst, row) in &edges.rows {
            let resolve = |oid, label| {
                vertex_map
                    .get_gid(label, oid)
                    .ok_or(Error::UnresolvedEndpoint { elabel, oid })
            };
            let src_gid = resolve(*src, edges.src_label)?;
            let dst_gid = resolve(*dst, edges.dst_label)?;
            let src_inner = id_parser.get_fid(src_gid) == fid;
            let dst_inner = id_parser.get_fid(dst_gid) == fid;
            if !src_inner && !dst_inner {
                continue;
            }
            let eid = rows.len() as u64;
            rows.push(row);
            let src_lid = if src_inner {
                id_parser.lid(src_gid)
            } else {
                outer.lid(src_gid)
            };
            let dst_lid = if dst_inner {
                id_parser.lid(dst_gid)
            } else {
                outer.lid(dst_gid)
            };
            if src_inner {
                oe_entries[edges.src_label][elabel]
                    .push((id_parser.get_offset(src_lid), Nbr::new(dst_lid, eid)));
            }
            if dst_inner {
                let entry = (id_parser.get_offset(dst_lid), Nbr::new(src_lid, eid));
                if meta.directed {
                    ie_entries[edges.dst_label][elabel].push(entry);
                } else if src_lid != dst_lid {
                    oe_entries[edges.dst_label][elabel].push(entry);
                }
            }
        }
        edge_rows.push(rows);
    }
    let csrs = |entries: Vec<Vec<Vec<(VId, Nbr)>>>| -> Vec<Vec<Vec<u64>>> {
        entries
            .into_iter()
            .enumerate()
            .map(|(vlabel, per_elabel)| {
                per_elabel
                    .into_iter()
                    .map(|mut entries| {
                        Csr::build(vertex_map.inner_count(fid, vlabel), &mut entries)
                    })
                    .collect()
            })
            .collect()
    };
    let oe = csrs(oe_entries);
    let ie = if meta.directed {
        csrs(ie_entries)
    } else {
        vec![]
    };
    info!(
        "fragment {}: {} edges, {} outer vertices",
        fid,
        edge_rows.iter().map(Vec::len).sum::<usize>(),
        outer.lids.len()
    );
    Ok(FragmentData {
        vertex_rows,
        outer_gids: outer.gids,
        edge_rows,
        oe,
        ie,
    })
}

fn write_graph(store: &Store, data: &GraphData, meta: Meta, vertex_map: &VertexMap) -> Result<()> {
    store.put_meta(&meta)?;
    for (label, vertices) in data.vertices.iter().enumerate() {
        store.put_schema(&keys::vertex_schema(label), &vertices.schema)?;
        for fid in 0..meta.fnum {
            store.put_oids(&keys::vertex_map(fid, label), vertex_map.oids(fid, label))?;
        }
    }
    for (label, edges) in data.edges.iter().enumerate() {
        store.put_schema(&keys::edge_schema(label), &edges.schema)?;
        store.put_relation(label, (edges.src_label, edges.dst_label))?;
    }
    Ok(())
}

fn write_fragment(
    store: &Store,
    data: &GraphData,
    meta: Meta,
    fid: FId,
    fragment: &FragmentData,
) -> Result<()> {
    for (label, vertices) in data.vertices.iter().enumerate() {
        let (inner, outer) = (
            fragment.vertex_rows[label].len(),
            fragment.outer_gids[label].len(),
        );
        store.put_words(
            &keys::vertex_num(fid, label),
            &[inner as u64, outer as u64, (inner + outer) as u64],
        )?;
        store.put_outer_gids(fid, label, &fragment.outer_gids[label])?;
        store.write_table(
            &keys::vertex_table(fid, label),
            &vertices.schema,
            &fragment.vertex_rows[label],
        )?;
    }
    for (label, edges) in data.edges.iter().enumerate() {
        let rows: Vec<Row> = fragment.edge_rows[label]
            .iter()
            .map(|&row| row.clone())
            .collect();
        store.write_table(&keys::edge_table(fid, label), &edges.schema, &rows)?;
    }
    for vlabel in 0..meta.vertex_label_num {
        for elabel in 0..meta.edge_label_num {
            store.put_words(&keys::oe(fid, vlabel, elabel), &fragment.oe[vlabel][elabel])?;
            if meta.directed {
                store.put_words(&keys::ie(fid, vlabel, elabel), &fragment.ie[vlabel][elabel])?;
            }
        }
    }
    Ok(())
}
