use crate::{
    appender::Appender,
    comm::Communicator,
    error::Result,
    fragment::{Fragment, LoadOptions},
    store::Store,
    types::{ELabel, VLabel},
    vertex_map::VertexMap,
};
use log::info;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Asks a [`Worker`] to stop between batches. Cheap to clone and `Send`, so
/// it can be handed to signal handling glue.
#[derive(Clone, Debug, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The context of one fragment: its data and its communicator.
pub struct Worker<C: Communicator> {
    fragment: Fragment,
    comm: C,
    shutdown: ShutdownHandle,
}

impl<C: Communicator> Worker<C> {
    /// Loads the fragment of `comm` from `store`.
    pub fn init(
        store: &Store,
        vertex_map: Arc<VertexMap>,
        comm: C,
        options: &LoadOptions,
    ) -> Result<Self> {
        let fragment = Fragment::load(store, comm.fid(), vertex_map, options)?;
        Ok(Self::new(fragment, comm))
    }

    pub fn new(fragment: Fragment, comm: C) -> Self {
        info!("worker {}/{} ready", comm.fid(), comm.fnum());
        Self {
            fragment,
            comm,
            shutdown: ShutdownHandle::default(),
        }
    }

    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Whether any worker of the cluster was asked to shut down.
    ///
    /// This is a collective, every worker must call it at the same point.
    pub fn should_stop(&self) -> bool {
        self.comm
            .all_gather(self.shutdown.is_shutdown())
            .into_iter()
            .any(|stop| stop)
    }

    pub fn extend(
        &mut self,
        vertex_lines: &BTreeMap<VLabel, Vec<String>>,
        edge_lines: &BTreeMap<ELabel, Vec<String>>,
        header_row: bool,
        delimiter: char,
    ) -> Result<usize> {
        let directed = self.fragment.directed();
        Appender::new(&mut self.fragment, &self.comm).extend(
            vertex_lines,
            edge_lines,
            header_row,
            delimiter,
            directed,
        )
    }

    pub fn shutdown(self) -> Fragment {
        self.comm.barrier();
        info!("worker {} shut down", self.comm.fid());
        self.fragment
    }
}
