//! Collective operations between the fragments of one cluster.

use crate::types::FId;
use std::{
    any::Any,
    sync::{Arc, Barrier, Mutex, PoisonError},
};

/// Blocking collectives over every fragment of a cluster.
///
/// Every fragment must issue the same sequence of calls.
pub trait Communicator {
    fn fid(&self) -> FId;

    fn fnum(&self) -> usize;

    fn barrier(&self);

    /// Returns the values contributed by every fragment, indexed by fid.
    fn all_gather<T: Clone + Send + 'static>(&self, value: T) -> Vec<T>;

    fn sum(&self, value: usize) -> usize {
        self.all_gather(value).into_iter().sum()
    }
}

struct Shared {
    barrier: Barrier,
    slots: Mutex<Vec<Option<Box<dyn Any + Send>>>>,
}

/// An in-process cluster whose fragments run on separate threads.
pub struct LocalCluster;

impl LocalCluster {
    /// Creates the communicators of `fnum` fragments, the i-th one for fid i.
    pub fn new(fnum: usize) -> Vec<LocalComm> {
        assert!(fnum > 0, "fnum must be positive");
        let shared = Arc::new(Shared {
            barrier: Barrier::new(fnum),
            slots: Mutex::new((0..fnum).map(|_| None).collect()),
        });
        (0..fnum)
            .map(|fid| LocalComm {
                fid,
                fnum,
                shared: shared.clone(),
            })
            .collect()
    }
}

pub struct LocalComm {
    fid: FId,
    fnum: usize,
    shared: Arc<Shared>,
}

impl Communicator for LocalComm {
    fn fid(&self) -> FId {
        self.fid
    }

    fn fnum(&self) -> usize {
        self.fnum
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn all_gather<T: Clone + Send + 'static>(&self, value: T) -> Vec<T> {
        let slots = &self.shared.slots;
        slots.lock().unwrap_or_else(PoisonError::into_inner)[self.fid] = Some(Box::new(value));
        self.barrier();
        let values = slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|slot| {
                slot.as_ref()
                    .and_then(|value| value.downcast_ref::<T>())
                    .cloned()
                    .unwrap_or_else(|| panic!("mismatched all_gather on fragment {}", self.fid))
            })
            .collect();
        self.barrier();
        slots.lock().unwrap_or_else(PoisonError::into_inner)[self.fid] = None;
        values
    }
}
