use fragstore::{
    comm::{Communicator, LocalCluster},
    fragment::LoadOptions,
    store::{
        build::{build, BuildOptions, EdgeData, GraphData, VertexData},
        Store,
    },
    table::{Field, Row, Schema},
    types::{DataType, PropertyValue},
    worker::Worker,
};
use std::{collections::BTreeMap, sync::Arc};

fn create_store(path: &std::path::Path, fnum: usize) -> Store {
    let person = Arc::new(Schema::new(vec![Field::new("age", DataType::Int32)]));
    let mut persons = VertexData::new(person.clone());
    for oid in 0..6 {
        let age = PropertyValue::Int32(20 + oid as i32);
        persons.rows.push((oid, Row::new(person.clone(), vec![age]).unwrap()));
    }
    let data = GraphData {
        vertices: vec![persons],
        edges: vec![EdgeData::new(0, 0, Arc::new(Schema::new(vec![])))],
    };
    let store = Store::open(path).unwrap();
    build(&store, &data, &BuildOptions::new(fnum)).unwrap();
    store
}

#[test]
fn test_worker_batches_and_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    create_store(&path, 3);
    let vertex_lines: BTreeMap<_, _> = vec![(0, vec![String::from("6,40")])].into_iter().collect();
    let edge_lines: BTreeMap<_, _> = vec![(0, vec![String::from("6,1"), String::from("2,6")])]
        .into_iter()
        .collect();

    let results: Vec<(usize, Vec<usize>, usize)> = std::thread::scope(|s| {
        let handles: Vec<_> = LocalCluster::new(3)
            .into_iter()
            .map(|comm| {
                let (path, vertex_lines, edge_lines) = (&path, &vertex_lines, &edge_lines);
                s.spawn(move || {
                    let store = Store::open(path).unwrap();
                    let vertex_map = Arc::new(store.load_vertex_map().unwrap());
                    let mut worker =
                        Worker::init(&store, vertex_map, comm, &LoadOptions::new()).unwrap();
                    let fid = worker.comm().fid();
                    assert_eq!(worker.fragment().fid(), fid);
                    let mut counts = vec![];
                    for round in 0..3 {
                        if round == 1 && fid == 2 {
                            worker.shutdown_handle().shutdown();
                        }
                        if worker.should_stop() {
                            break;
                        }
                        counts.push(worker.extend(vertex_lines, edge_lines, false, ',').unwrap());
                    }
                    let fragment = worker.shutdown();
                    (fid, counts, fragment.inner_count(0))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (fid, counts, inner) in results {
        // the first batch adds both edges, the stop request ends the loop on every worker
        assert_eq!(counts, [2], "fragment {}", fid);
        assert_eq!(inner, if fid == 0 { 3 } else { 2 });
    }
}
