use crate::types::{FId, Oid};

/// Assigns every original vertex id to the fragment owning it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashPartitioner {
    fnum: usize,
}

impl HashPartitioner {
    pub fn new(fnum: usize) -> Self {
        assert!(fnum > 0, "fnum must be positive");
        Self { fnum }
    }

    pub fn fnum(&self) -> usize {
        self.fnum
    }

    pub fn partition(&self, oid: Oid) -> FId {
        oid.rem_euclid(self.fnum as Oid) as FId
    }
}
