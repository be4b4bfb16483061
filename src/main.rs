use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use fragstore::{
    comm::LocalCluster,
    fragment::{Fragment, LoadOptions},
    store::{
        build::{build, BuildOptions, GraphData},
        Store,
    },
    types::{ELabel, VLabel},
    worker::Worker,
};
use log::{error, info};
use std::{collections::BTreeMap, error::Error, fs, sync::Arc};

type BoxResult<T> = Result<T, Box<dyn Error>>;

fn parse_delimiter(matches: &ArgMatches) -> BoxResult<char> {
    let delimiter = matches.value_of("delimiter").unwrap_or(",");
    let mut chars = delimiter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ if delimiter == "\\t" => Ok('\t'),
        _ => Err(format!("invalid delimiter `{}`", delimiter).into()),
    }
}

fn parse_usize(matches: &ArgMatches, name: &str, default: usize) -> BoxResult<usize> {
    match matches.value_of(name) {
        Some(value) => Ok(value
            .parse()
            .map_err(|_| format!("invalid {} `{}`", name, value))?),
        None => Ok(default),
    }
}

/// Splits `LABEL=FILE`.
fn parse_labeled_file(arg: &str) -> BoxResult<(usize, &str)> {
    let (label, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected LABEL=FILE, found `{}`", arg))?;
    let label = label
        .parse()
        .map_err(|_| format!("invalid label `{}`", label))?;
    Ok((label, path))
}

fn handle_create(matches: &ArgMatches) -> BoxResult<()> {
    let delimiter = parse_delimiter(matches)?;
    let options = BuildOptions::new(parse_usize(matches, "fnum", 1)?)
        .directed(!matches.is_present("undirected"));
    let mut data = GraphData::default();
    for path in matches.values_of("vertices").into_iter().flatten() {
        data.vertices.push(GraphData::read_vertices(path, delimiter)?);
    }
    for arg in matches.values_of("edges").into_iter().flatten() {
        let parts: Vec<_> = arg.splitn(3, ':').collect();
        match parts.as_slice() {
            [src, dst, path] => data.edges.push(GraphData::read_edges(
                path,
                delimiter,
                src.parse()?,
                dst.parse()?,
            )?),
            _ => return Err(format!("expected SRC:DST:FILE, found `{}`", arg).into()),
        }
    }
    let path = matches.value_of("STORE").unwrap_or_default();
    if fs::metadata(path).is_ok() {
        fs::remove_file(path)?;
    }
    build(&Store::open(path)?, &data, &options)?;
    Ok(())
}

fn handle_info(matches: &ArgMatches) -> BoxResult<()> {
    let store = Store::open(matches.value_of("STORE").unwrap_or_default())?;
    let meta = store.meta()?;
    println!(
        "fnum={} vertex_labels={} edge_labels={} directed={}",
        meta.fnum, meta.vertex_label_num, meta.edge_label_num, meta.directed
    );
    let vertex_map = Arc::new(store.load_vertex_map()?);
    for fid in 0..meta.fnum {
        let fragment = Fragment::load(&store, fid, vertex_map.clone(), &LoadOptions::new())?;
        for label in 0..fragment.vertex_label_count() {
            println!(
                "fragment {} vertex label {}: inner={} outer={} schema=\"{}\"",
                fid,
                label,
                fragment.inner_count(label),
                fragment.outer_count(label),
                fragment.vertex_schema(label)
            );
        }
        for label in 0..fragment.edge_label_count() {
            println!(
                "fragment {} edge label {} {:?}: edges={} schema=\"{}\"",
                fid,
                label,
                fragment.edge_relation(label),
                fragment.edge_count(label),
                fragment.edge_schema(label)
            );
        }
    }
    Ok(())
}

/// Reads `LABEL=FILE` arguments into batches of at most `batch_size` data
/// lines per label, repeating the header in every batch.
fn read_batches(
    args: Option<clap::Values>,
    header_row: bool,
    batch_size: usize,
) -> BoxResult<Vec<BTreeMap<usize, Vec<String>>>> {
    let mut batches: Vec<BTreeMap<usize, Vec<String>>> = vec![];
    for arg in args.into_iter().flatten() {
        let (label, path) = parse_labeled_file(arg)?;
        let lines: Vec<String> = fs::read_to_string(path)?
            .lines()
            .map(str::to_owned)
            .collect();
        let (header, data) = match (header_row, lines.split_first()) {
            (true, Some((header, data))) => (Some(header), data),
            _ => (None, lines.as_slice()),
        };
        for (i, chunk) in data.chunks(batch_size).enumerate() {
            if batches.len() <= i {
                batches.push(BTreeMap::new());
            }
            let batch = batches[i].entry(label).or_default();
            batch.extend(header.cloned());
            batch.extend_from_slice(chunk);
        }
    }
    Ok(batches)
}

fn handle_extend(matches: &ArgMatches) -> BoxResult<()> {
    let delimiter = parse_delimiter(matches)?;
    let header_row = matches.is_present("header");
    let batch_size = parse_usize(matches, "batch-size", usize::MAX)?.max(1);
    let vertex_batches = read_batches(matches.values_of("vertices"), header_row, batch_size)?;
    let edge_batches = read_batches(matches.values_of("edges"), header_row, batch_size)?;
    let num_batches = vertex_batches.len().max(edge_batches.len());
    let options = match matches.value_of("spill-dir") {
        Some(dir) => LoadOptions::new().spill_dir(dir),
        None => LoadOptions::new(),
    };
    let store = Store::open(matches.value_of("STORE").unwrap_or_default())?;
    let meta = store.meta()?;
    let vertex_map = Arc::new(store.load_vertex_map()?);
    let fragments = (0..meta.fnum)
        .map(|fid| Fragment::load(&store, fid, vertex_map.clone(), &options))
        .collect::<Result<Vec<_>, _>>()?;
    let empty = BTreeMap::new();
    let results: Vec<Result<Vec<usize>, String>> = std::thread::scope(|s| {
        let handles: Vec<_> = fragments
            .into_iter()
            .zip(LocalCluster::new(meta.fnum))
            .map(|(fragment, comm)| {
                let (vertex_batches, edge_batches) = (&vertex_batches, &edge_batches);
                let empty = &empty;
                s.spawn(move || -> Result<Vec<usize>, String> {
                    let mut worker = Worker::new(fragment, comm);
                    let mut counts = vec![];
                    for i in 0..num_batches {
                        if worker.should_stop() {
                            break;
                        }
                        let vertex_lines: &BTreeMap<VLabel, _> =
                            vertex_batches.get(i).unwrap_or(empty);
                        let edge_lines: &BTreeMap<ELabel, _> =
                            edge_batches.get(i).unwrap_or(empty);
                        let count = worker
                            .extend(vertex_lines, edge_lines, header_row, delimiter)
                            .map_err(|e| e.to_string())?;
                        counts.push(count);
                    }
                    worker.shutdown();
                    Ok(counts)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(String::from("worker panicked")))
            })
            .collect()
    });
    let mut counts = None;
    for result in results {
        counts = Some(result?);
    }
    for (i, count) in counts.unwrap_or_default().into_iter().enumerate() {
        info!("batch {}: {} edges added", i, count);
        println!("batch {}: {} edges added", i, count);
    }
    Ok(())
}

fn run() -> BoxResult<()> {
    let delimiter = Arg::with_name("delimiter")
        .short("d")
        .long("delimiter")
        .takes_value(true)
        .help("Field delimiter [default: ,]");
    let matches = App::new("fragstore")
        .about("Append-only partitioned property graph fragments")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("create")
                .about("Partitions delimited vertex and edge files into a store")
                .arg(Arg::with_name("STORE").required(true))
                .arg(
                    Arg::with_name("fnum")
                        .short("n")
                        .long("fnum")
                        .takes_value(true)
                        .help("Number of fragments [default: 1]"),
                )
                .arg(Arg::with_name("undirected").long("undirected"))
                .arg(delimiter.clone())
                .arg(
                    Arg::with_name("vertices")
                        .short("v")
                        .long("vertices")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1)
                        .help("Vertex file with header `id,name:type,...`, one per label"),
                )
                .arg(
                    Arg::with_name("edges")
                        .short("e")
                        .long("edges")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1)
                        .help("SRC_LABEL:DST_LABEL:FILE with header `src,dst,name:type,...`"),
                ),
        )
        .subcommand(
            SubCommand::with_name("info")
                .about("Prints the counts of every fragment")
                .arg(Arg::with_name("STORE").required(true)),
        )
        .subcommand(
            SubCommand::with_name("extend")
                .about("Loads every fragment and appends batches of vertices and edges")
                .arg(Arg::with_name("STORE").required(true))
                .arg(delimiter)
                .arg(Arg::with_name("header").long("header"))
                .arg(
                    Arg::with_name("batch-size")
                        .long("batch-size")
                        .takes_value(true)
                        .help("Data lines per label and batch"),
                )
                .arg(Arg::with_name("spill-dir").long("spill-dir").takes_value(true))
                .arg(
                    Arg::with_name("vertices")
                        .short("v")
                        .long("vertices")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1)
                        .help("LABEL=FILE"),
                )
                .arg(
                    Arg::with_name("edges")
                        .short("e")
                        .long("edges")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1)
                        .help("LABEL=FILE"),
                ),
        )
        .get_matches();
    match matches.subcommand() {
        ("create", Some(matches)) => handle_create(matches),
        ("info", Some(matches)) => handle_info(matches),
        ("extend", Some(matches)) => handle_extend(matches),
        _ => Ok(()),
    }
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
