use fragstore::{
    appender::Appender,
    comm::{LocalCluster, LocalComm},
    error::{Error, Result},
    fragment::{Fragment, LoadOptions},
    store::{
        build::{build, BuildOptions, EdgeData, GraphData, VertexData},
        Store,
    },
    table::{Field, Row, Schema},
    types::{DataType, Oid, PropertyValue, Vertex},
};
use proptest::prelude::*;
use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

fn person() -> Arc<Schema> {
    Arc::new(Schema::new(vec![Field::new("name", DataType::String)]))
}

fn knows() -> Arc<Schema> {
    Arc::new(Schema::new(vec![Field::new("weight", DataType::Double)]))
}

/// Vertex label 0 is a person, vertex label 1 a city, edge label 0 connects
/// persons.
fn create_fragments(fnum: usize, directed: bool, oids: &[Oid], edges: &[(Oid, Oid)]) -> Vec<Fragment> {
    let (person, knows) = (person(), knows());
    let mut persons = VertexData::new(person.clone());
    for &oid in oids {
        let name = PropertyValue::String(format!("p{}", oid));
        persons.rows.push((oid, Row::new(person.clone(), vec![name]).unwrap()));
    }
    let mut relations = EdgeData::new(0, 0, knows.clone());
    for &(src, dst) in edges {
        let weight = PropertyValue::Double(1.0);
        relations
            .rows
            .push((src, dst, Row::new(knows.clone(), vec![weight]).unwrap()));
    }
    let data = GraphData {
        vertices: vec![persons, VertexData::new(person)],
        edges: vec![relations],
    };
    let store = Store::open_in_memory().unwrap();
    build(&store, &data, &BuildOptions::new(fnum).directed(directed)).unwrap();
    let vertex_map = Arc::new(store.load_vertex_map().unwrap());
    (0..fnum)
        .map(|fid| Fragment::load(&store, fid, vertex_map.clone(), &LoadOptions::new()).unwrap())
        .collect()
}

/// Runs `f` on every fragment, each on its own thread.
fn run<T, F>(fragments: Vec<Fragment>, f: F) -> (Vec<Fragment>, Vec<T>)
where
    T: Send,
    F: Fn(&mut Fragment, &LocalComm) -> T + Sync,
{
    let comms = LocalCluster::new(fragments.len());
    std::thread::scope(|s| {
        let handles: Vec<_> = fragments
            .into_iter()
            .zip(comms)
            .map(|(mut fragment, comm)| {
                let f = &f;
                s.spawn(move || {
                    let result = f(&mut fragment, &comm);
                    (fragment, result)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).unzip()
    })
}

fn lines(labeled: &[(usize, &str)]) -> BTreeMap<usize, Vec<String>> {
    labeled
        .iter()
        .map(|&(label, text)| (label, text.lines().map(str::to_owned).collect()))
        .collect()
}

fn extend(
    fragments: Vec<Fragment>,
    vertices: &[(usize, &str)],
    edges: &[(usize, &str)],
    header_row: bool,
    directed: bool,
) -> (Vec<Fragment>, Vec<Result<usize>>) {
    let (vertex_lines, edge_lines) = (lines(vertices), lines(edges));
    run(fragments, |fragment, comm| {
        Appender::new(fragment, comm).extend(&vertex_lines, &edge_lines, header_row, ',', directed)
    })
}

fn counts(fragments: &[Fragment], label: usize) -> Vec<(usize, usize)> {
    fragments
        .iter()
        .map(|f| (f.inner_count(label), f.outer_count(label)))
        .collect()
}

fn check_count_invariant(fragments: &[Fragment]) {
    for f in fragments {
        for label in 0..f.vertex_label_count() {
            let inner: Vec<_> = f.inner_vertices(label).collect();
            let outer: Vec<_> = f.outer_vertices(label).collect();
            assert_eq!(f.vertex_count(label), inner.len() + outer.len());
            assert_eq!(f.vertices(label).count(), f.vertex_count(label));
            assert!(inner.iter().all(|&v| f.is_inner(v) && !f.is_outer(v)));
            assert!(outer.iter().all(|&v| f.is_outer(v) && !f.is_inner(v)));
            let distinct: HashSet<_> = f.vertices(label).collect();
            assert_eq!(distinct.len(), f.vertex_count(label));
            for v in f.vertices(label) {
                let oid = f.get_id(v).unwrap();
                assert_eq!(f.vertex_for_oid(label, oid), Some(v));
            }
        }
    }
}

fn neighbor_oids(f: &Fragment, v: Vertex, incoming: bool) -> Vec<Oid> {
    let (base, extended) = if incoming {
        (f.incoming_adjacency(v, 0), f.extended_incoming_adjacency(v, 0))
    } else {
        (f.outgoing_adjacency(v, 0), f.extended_outgoing_adjacency(v, 0))
    };
    base.iter()
        .chain(extended)
        .map(|nbr| f.get_id(nbr.vertex()).unwrap())
        .collect()
}

#[test]
fn test_new_vertex_and_cross_fragment_edge() {
    let fragments = create_fragments(2, true, &[0, 1, 2, 3, 4, 5, 6, 7], &[]);
    assert_eq!(counts(&fragments, 0), [(4, 0), (4, 0)]);
    let batch_vertices = [(0, "100,new")];
    let batch_edges = [(0, "100,1,0.5")];
    let (fragments, results) = extend(fragments, &batch_vertices, &batch_edges, false, true);
    assert!(results.iter().all(|r| matches!(r, Ok(1))));
    assert_eq!(counts(&fragments, 0), [(5, 1), (4, 1)]);
    check_count_invariant(&fragments);

    let (f0, f1) = (&fragments[0], &fragments[1]);
    let v100 = f0.vertex_for_oid(0, 100).unwrap();
    assert!(f0.is_inner(v100));
    assert_eq!(f0.vertex_offset(v100), 4);
    assert_eq!(
        f0.property(v100, 0),
        Some(PropertyValue::String(String::from("new")))
    );
    assert_eq!(f0.get_property::<String>(v100, 0).unwrap().as_deref(), Some("new"));
    assert!(f0.outgoing_adjacency(v100, 0).is_empty());
    assert_eq!(neighbor_oids(f0, v100, false), [1]);
    let eid = f0.extended_outgoing_adjacency(v100, 0)[0].eid;
    assert_eq!(f0.edge_property(0, eid, 0), Some(PropertyValue::Double(0.5)));

    let v1 = f1.vertex_for_oid(0, 1).unwrap();
    assert_eq!(neighbor_oids(f1, v1, true), [100]);
    assert!(f1.extended_outgoing_adjacency(v1, 0).is_empty());
    let o100 = f1.vertex_for_oid(0, 100).unwrap();
    assert!(f1.is_outer(o100));
    assert_eq!(f1.property(o100, 0), None);

    // replaying the batch changes nothing
    let (fragments, results) = extend(fragments, &batch_vertices, &batch_edges, false, true);
    assert!(results.iter().all(|r| matches!(r, Ok(0))));
    assert_eq!(counts(&fragments, 0), [(5, 1), (4, 1)]);
    assert_eq!(fragments[0].edge_count(0), 1);
    assert_eq!(fragments[1].edge_count(0), 1);
    check_count_invariant(&fragments);
}

#[test]
fn test_undirected_edges() {
    let fragments = create_fragments(2, false, &[0, 1, 2, 3], &[]);
    let (fragments, results) = extend(fragments, &[], &[(0, "0,1,1\n0,2,1\n2,0,1")], false, false);
    assert!(results.iter().all(|r| matches!(r, Ok(2))));
    let (f0, f1) = (&fragments[0], &fragments[1]);
    let v = |f: &Fragment, oid| f.vertex_for_oid(0, oid).unwrap();
    let mut oids = neighbor_oids(f0, v(f0, 0), false);
    oids.sort_unstable();
    assert_eq!(oids, [1, 2]);
    assert_eq!(neighbor_oids(f0, v(f0, 2), false), [0]);
    assert_eq!(neighbor_oids(f1, v(f1, 1), false), [0]);
    assert_eq!(
        f1.extended_incoming_adjacency(v(f1, 1), 0),
        f1.extended_outgoing_adjacency(v(f1, 1), 0)
    );
    // both directions of a local edge share one edge row
    assert_eq!(f0.edge_count(0), 2);
    assert_eq!(f1.edge_count(0), 1);
    check_count_invariant(&fragments);
}

#[test]
fn test_dedup_against_loaded_edges() {
    let fragments = create_fragments(2, true, &[0, 1, 2, 3], &[(0, 1), (0, 2)]);
    let (fragments, results) = extend(fragments, &[], &[(0, "0,1,2\n0,2,2\n2,0,2")], false, true);
    assert!(results.iter().all(|r| matches!(r, Ok(1))));
    let f0 = &fragments[0];
    let v0 = f0.vertex_for_oid(0, 0).unwrap();
    assert_eq!(f0.outgoing_adjacency(v0, 0).len(), 2);
    assert!(f0.extended_outgoing_adjacency(v0, 0).is_empty());
    assert_eq!(neighbor_oids(f0, v0, true), [2]);
    assert_eq!(fragments[1].edge_count(0), 1);
}

#[test]
fn test_header_row() {
    let fragments = create_fragments(2, true, &[0, 1], &[]);
    let (fragments, results) = extend(
        fragments,
        &[(0, "id,name\n10,a\n11,b\n12,c")],
        &[(0, "src,dst,weight:double\n10,11,1\n12,0,1")],
        true,
        true,
    );
    assert!(results.iter().all(|r| matches!(r, Ok(2))));
    assert_eq!(counts(&fragments, 0), [(3, 1), (2, 1)]);
    let (_, results) = extend(fragments, &[(0, "id,title\n20,x")], &[], true, true);
    assert!(results
        .iter()
        .all(|r| matches!(r, Err(Error::SchemaMismatch { .. }))));
}

#[test]
fn test_label_mismatch() {
    let fragments = create_fragments(2, true, &[0, 1, 2, 3], &[]);
    let before = fragments.iter().map(|f| f.inner_count(1)).collect::<Vec<_>>();
    let (fragments, results) = extend(fragments, &[(1, "9,x\n3,y")], &[], false, true);
    assert!(results.iter().all(|r| matches!(
        r,
        Err(Error::LabelMismatch {
            oid: 3,
            expected: 1,
            found: 0
        })
    )));
    assert_eq!(fragments.iter().map(|f| f.inner_count(1)).collect::<Vec<_>>(), before);
    assert_eq!(fragments[1].vertex_for_oid(1, 9), None);
    let (_, results) = extend(fragments, &[(1, "9,x")], &[(0, "9,0,1")], false, true);
    assert!(results
        .iter()
        .all(|r| matches!(r, Err(Error::LabelMismatch { oid: 9, .. }))));
}

#[test]
fn test_unresolved_endpoint() {
    let fragments = create_fragments(2, true, &[0, 1], &[]);
    let (fragments, results) = extend(fragments, &[(0, "5,x")], &[(0, "5,42,1")], false, true);
    assert!(results
        .iter()
        .all(|r| matches!(r, Err(Error::UnresolvedEndpoint { elabel: 0, oid: 42 }))));
    assert_eq!(counts(&fragments, 0), [(1, 0), (1, 0)]);
}

#[test]
fn test_parse_failure_reaches_every_fragment() {
    let fragments = create_fragments(2, true, &[0, 1], &[]);
    let (fragments, results) = extend(fragments, &[(0, "5,a\n6,b\nx,c\n8,d")], &[], false, true);
    assert!(matches!(results[0], Err(Error::Batch { fid: 1, .. })));
    assert!(matches!(results[1], Err(Error::Parse { line: 3, .. })));
    assert_eq!(counts(&fragments, 0), [(1, 0), (1, 0)]);
    let (_, results) = extend(fragments, &[], &[], false, false);
    assert!(results
        .iter()
        .all(|r| matches!(r, Err(Error::DirectednessMismatch { .. }))));
}

#[test]
fn test_repeated_batches() {
    let mut fragments = create_fragments(3, true, &(0..9).collect::<Vec<Oid>>(), &[(0, 1)]);
    let mut total = 0;
    for round in 0..4 {
        let vertices = format!("{},v\n{},w", 100 + round, 200 + round);
        let edges = format!(
            "{},{},1\n{},{},1\n0,1,1",
            100 + round,
            200 + round,
            round,
            100 + round
        );
        let (next, results) = extend(
            fragments,
            &[(0, vertices.as_str())],
            &[(0, edges.as_str())],
            false,
            true,
        );
        fragments = next;
        let added: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        assert!(added.iter().all(|&n| n == 2));
        total += added[0];
        check_count_invariant(&fragments);
    }
    assert_eq!(total, 8);
    let inner: usize = fragments.iter().map(|f| f.inner_count(0)).sum();
    assert_eq!(inner, 17);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_undirected_symmetry(
        fnum in 1usize..4,
        edges in prop::collection::vec((0i64..12, 0i64..12), 0..24),
    ) {
        let fragments = create_fragments(fnum, false, &(0..8).collect::<Vec<Oid>>(), &[]);
        let batch_vertices = "8,a\n9,b\n10,c\n11,d";
        let batch_edges = edges
            .iter()
            .map(|(src, dst)| format!("{},{},1", src, dst))
            .collect::<Vec<_>>()
            .join("\n");
        let (fragments, results) =
            extend(fragments, &[(0, batch_vertices)], &[(0, batch_edges.as_str())], false, false);
        let pairs: HashSet<_> = edges
            .iter()
            .map(|&(a, b)| (a.min(b), a.max(b)))
            .collect();
        for result in &results {
            prop_assert_eq!(result.as_ref().ok().copied(), Some(pairs.len()));
        }
        let owner = |oid: Oid| &fragments[oid.rem_euclid(fnum as Oid) as usize];
        for &(a, b) in &edges {
            let fa = owner(a);
            let fb = owner(b);
            prop_assert!(neighbor_oids(fa, fa.vertex_for_oid(0, a).unwrap(), false).contains(&b));
            prop_assert!(neighbor_oids(fb, fb.vertex_for_oid(0, b).unwrap(), false).contains(&a));
        }
        check_count_invariant(&fragments);
    }
}
