use super::{Csr, ExtendedAdjacency, Fragment, LoadOptions};
use crate::{
    error::{Error, Result},
    store::{keys, Store},
    table::AppendOnlyTable,
    types::FId,
    vertex_map::{IdentityMap, VertexMap},
};
use log::{debug, info};
use std::sync::Arc;

impl Fragment {
    /// Loads fragment `fid` from `store`.
    ///
    /// `vertex_map` is the load-time identity map of the whole store, shared by
    /// every fragment loaded in the process.
    pub fn load(
        store: &Store,
        fid: FId,
        vertex_map: Arc<VertexMap>,
        options: &LoadOptions,
    ) -> Result<Self> {
        let meta = store.meta()?;
        if fid >= meta.fnum {
            return Err(Error::MissingObject(format!("fragment/{}", fid)));
        }
        if vertex_map.fnum() != meta.fnum || vertex_map.label_num() != meta.vertex_label_num {
            return Err(Error::Corrupted(String::from("vertex map")));
        }
        info!("loading fragment {}/{}...", fid, meta.fnum);
        let vertex_schemas = (0..meta.vertex_label_num)
            .map(|label| store.get_schema(&keys::vertex_schema(label)))
            .collect::<Result<Vec<_>>>()?;
        let edge_schemas = (0..meta.edge_label_num)
            .map(|label| store.get_schema(&keys::edge_schema(label)))
            .collect::<Result<Vec<_>>>()?;
        let relations = (0..meta.edge_label_num)
            .map(|label| {
                let (src, dst) = store.get_relation(label)?;
                if src >= meta.vertex_label_num || dst >= meta.vertex_label_num {
                    return Err(Error::Corrupted(keys::edge_relation(label)));
                }
                Ok((src, dst))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut outer_gids = Vec::with_capacity(meta.vertex_label_num);
        for label in 0..meta.vertex_label_num {
            let key = keys::vertex_num(fid, label);
            let (inner, outer) = match store.get_words(&key)?.as_slice() {
                &[inner, outer, total] if inner + outer == total => {
                    (inner as usize, outer as usize)
                }
                _ => return Err(Error::Corrupted(key)),
            };
            let gids = store.get_outer_gids(fid, label)?;
            if inner != vertex_map.inner_count(fid, label) || outer != gids.len() {
                return Err(Error::Corrupted(key));
            }
            debug!(
                "fragment {} label {}: {} inner, {} outer",
                fid, label, inner, outer
            );
            outer_gids.push(gids);
        }
        let identity = IdentityMap::new(fid, vertex_map, outer_gids);
        let load_csrs = |incoming: bool| {
            (0..meta.vertex_label_num)
                .map(|vlabel| {
                    (0..meta.edge_label_num)
                        .map(|elabel| {
                            let key = if incoming {
                                keys::ie(fid, vlabel, elabel)
                            } else {
                                keys::oe(fid, vlabel, elabel)
                            };
                            let csr =
                                Csr::from_words(&store.get_words(&key)?, options.buffer_type())?;
                            if csr.num_vertices() != identity.base_inner_count(vlabel) {
                                return Err(Error::Corrupted(key));
                            }
                            Ok(csr)
                        })
                        .collect::<Result<Vec<_>>>()
                })
                .collect::<Result<Vec<_>>>()
        };
        let oe = load_csrs(false)?;
        let ie = if meta.directed {
            load_csrs(true)?
        } else {
            vec![]
        };
        let vertex_tables = vertex_schemas
            .iter()
            .enumerate()
            .map(|(label, schema)| {
                let table = store.read_table(&keys::vertex_table(fid, label), schema.clone())?;
                if table.row_count() != identity.base_inner_count(label) {
                    return Err(Error::Corrupted(keys::vertex_table(fid, label)));
                }
                Ok(table)
            })
            .collect::<Result<Vec<_>>>()?;
        let edge_tables = edge_schemas
            .iter()
            .enumerate()
            .map(|(label, schema)| store.read_table(&keys::edge_table(fid, label), schema.clone()))
            .collect::<Result<Vec<_>>>()?;
        let extensions = || -> Vec<Vec<ExtendedAdjacency>> {
            (0..meta.vertex_label_num)
                .map(|_| {
                    (0..meta.edge_label_num)
                        .map(|_| ExtendedAdjacency::new())
                        .collect()
                })
                .collect()
        };
        let fragment = Self {
            fid,
            directed: meta.directed,
            identity,
            extra_vertex_tables: vec![AppendOnlyTable::new(); meta.vertex_label_num],
            extra_edge_tables: vec![AppendOnlyTable::new(); meta.edge_label_num],
            vertex_schemas,
            edge_schemas,
            relations,
            vertex_tables,
            edge_tables,
            oe,
            ie,
            extra_oe: extensions(),
            extra_ie: if meta.directed { extensions() } else { vec![] },
        };
        info!(
            "fragment {} loaded: {} inner vertices, {} edges",
            fid,
            (0..meta.vertex_label_num)
                .map(|label| fragment.inner_count(label))
                .sum::<usize>(),
            (0..meta.edge_label_num)
                .map(|label| fragment.edge_count(label))
                .sum::<usize>()
        );
        Ok(fragment)
    }
}
