use crate::{
    error::{Error, Result},
    fragment::BufferType,
    memory_manager::MemoryManager,
    tools::GroupBy,
    types::{Nbr, VId},
};
use rayon::slice::ParallelSliceMut;
use std::{mem::size_of, sync::Arc};

const WORD: usize = size_of::<u64>();
const HEADER_WORDS: usize = 2;

/// The immutable adjacency of one `(vertex label, edge label)` pair.
///
/// Rows are indexed by the source vertex offset and every row is sorted by
/// neighbor id. The underlying format of the buffer is:
///
/// ```text
/// +-----------------------------------------+
/// |   num_vertices: n   |   num_edges: m    |
/// +-----------------------------------------+
/// +-----------------------------------------+
/// |                offset                   |<-+
/// +-----------------------------------------+  |- n + 1 rows
///                     ...                    <-+
/// +--------------------+--------------------+
/// |      neighbor      |        eid         |<-+
/// +--------------------+--------------------+  |- m rows
///                     ...                    <-+
/// ```
#[derive(Clone)]
pub struct Csr {
    mm: Arc<MemoryManager>,
    num_vertices: usize,
    num_edges: usize,
}

impl Csr {
    /// Encodes `(source offset, nbr)` entries into the on-disk word layout.
    ///
    /// Every source offset must be below `num_vertices`.
    pub fn build(num_vertices: usize, entries: &mut [(VId, Nbr)]) -> Vec<u64> {
        entries.par_sort_unstable();
        let mut words = Vec::with_capacity(HEADER_WORDS + num_vertices + 1 + 2 * entries.len());
        words.push(num_vertices as u64);
        words.push(entries.len() as u64);
        words.push(0);
        let mut next = 0;
        let mut end = 0;
        for (src, group) in GroupBy::new(entries, |e| e.0) {
            assert!((src as usize) < num_vertices, "source {} out of range", src);
            while next < src {
                words.push(end);
                next += 1;
            }
            end += group.len() as u64;
            words.push(end);
            next += 1;
        }
        while (next as usize) < num_vertices {
            words.push(end);
            next += 1;
        }
        for (_, nbr) in entries.iter() {
            words.push(nbr.neighbor);
            words.push(nbr.eid);
        }
        words
    }

    pub fn from_words(words: &[u64], buffer: &BufferType) -> Result<Self> {
        if words.len() < HEADER_WORDS + 1 {
            return Err(Error::Corrupted(String::from("csr header")));
        }
        let (num_vertices, num_edges) = (words[0] as usize, words[1] as usize);
        if words.len() != HEADER_WORDS + num_vertices + 1 + 2 * num_edges {
            return Err(Error::Corrupted(format!(
                "csr with {} vertices and {} edges has {} words",
                num_vertices,
                num_edges,
                words.len()
            )));
        }
        let mut mm = match buffer {
            BufferType::Mem => MemoryManager::new_mem(words.len() * WORD),
            BufferType::MmapMut(dir) => MemoryManager::new_spill(dir, words.len() * WORD)?,
        };
        unsafe {
            mm.copy_from_slice(0, words);
        }
        let csr = Self {
            mm: Arc::new(mm),
            num_vertices,
            num_edges,
        };
        let offsets = csr.offsets();
        if offsets[num_vertices] as usize != num_edges || offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::Corrupted(String::from("csr offsets")));
        }
        Ok(csr)
    }

    pub fn empty(num_vertices: usize) -> Self {
        let words = Self::build(num_vertices, &mut []);
        let mut mm = MemoryManager::new_mem(words.len() * WORD);
        unsafe {
            mm.copy_from_slice(0, &words);
        }
        Self {
            mm: Arc::new(mm),
            num_vertices,
            num_edges: 0,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    fn offsets(&self) -> &[u64] {
        unsafe { self.mm.as_slice(HEADER_WORDS * WORD, self.num_vertices + 1) }
    }

    fn nbrs(&self) -> &[Nbr] {
        unsafe {
            self.mm.as_slice(
                (HEADER_WORDS + self.num_vertices + 1) * WORD,
                self.num_edges,
            )
        }
    }

    /// Returns the sorted adjacency of the vertex at `offset`, empty for rows
    /// this CSR does not cover.
    pub fn adjacency(&self, offset: VId) -> &[Nbr] {
        let offset = offset as usize;
        if offset >= self.num_vertices {
            return &[];
        }
        let offsets = self.offsets();
        &self.nbrs()[offsets[offset] as usize..offsets[offset + 1] as usize]
    }

    pub fn degree(&self, offset: VId) -> usize {
        self.adjacency(offset).len()
    }

    pub fn contains(&self, offset: VId, neighbor: VId) -> bool {
        contains(self.adjacency(offset), neighbor)
    }
}

/// Binary searches a sorted adjacency for `neighbor`.
pub fn contains(adjacency: &[Nbr], neighbor: VId) -> bool {
    adjacency
        .binary_search_by_key(&neighbor, |nbr| nbr.neighbor)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_csr() -> Csr {
        let mut entries = vec![
            (2, Nbr::new(7, 0)),
            (0, Nbr::new(5, 1)),
            (0, Nbr::new(3, 2)),
            (2, Nbr::new(1, 3)),
        ];
        let words = Csr::build(4, &mut entries);
        assert_eq!(words[..7], [4, 4, 0, 2, 2, 4, 4]);
        Csr::from_words(&words, &BufferType::Mem).unwrap()
    }

    #[test]
    fn test_adjacency() {
        let csr = create_csr();
        assert_eq!((csr.num_vertices(), csr.num_edges()), (4, 4));
        assert_eq!(csr.adjacency(0), [Nbr::new(3, 2), Nbr::new(5, 1)]);
        assert!(csr.adjacency(1).is_empty());
        assert_eq!(csr.adjacency(2), [Nbr::new(1, 3), Nbr::new(7, 0)]);
        assert!(csr.adjacency(3).is_empty());
        assert!(csr.adjacency(100).is_empty());
        assert_eq!(csr.degree(2), 2);
    }

    #[test]
    fn test_contains() {
        let csr = create_csr();
        assert!(csr.contains(0, 5));
        assert!(!csr.contains(0, 7));
        assert!(!csr.contains(9, 5));
    }

    #[test]
    fn test_empty() {
        let csr = Csr::empty(3);
        assert_eq!(csr.num_edges(), 0);
        assert!(csr.adjacency(1).is_empty());
        assert!(Csr::empty(0).adjacency(0).is_empty());
    }

    #[test]
    fn test_spilled() {
        let dir = tempfile::tempdir().unwrap();
        let words = Csr::build(2, &mut [(1, Nbr::new(0, 0))]);
        let csr = Csr::from_words(&words, &BufferType::MmapMut(dir.path().to_path_buf())).unwrap();
        assert_eq!(csr.adjacency(1), [Nbr::new(0, 0)]);
    }

    #[test]
    fn test_corrupted() {
        assert!(Csr::from_words(&[1], &BufferType::Mem).is_err());
        assert!(Csr::from_words(&[1, 1, 0, 0], &BufferType::Mem).is_err());
        assert!(Csr::from_words(&[1, 0, 1, 0], &BufferType::Mem).is_err());
    }
}
