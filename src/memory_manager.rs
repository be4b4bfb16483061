use memmap::MmapMut;
use std::fs::File;
use std::mem::{align_of, size_of};
use std::path::Path;

const WORD: usize = size_of::<u64>();

/// A buffer spilled to a memory mapped temporary file.
pub struct SpillFile {
    mmap: MmapMut,
    len: usize,
}

impl SpillFile {
    fn from_file(file: File) -> std::io::Result<Self> {
        let len = file.metadata()?.len() as usize;
        let mmap = if len == 0 {
            MmapMut::map_anon(1)?
        } else {
            unsafe { MmapMut::map_mut(&file)? }
        };
        Ok(Self { mmap, len })
    }
}

/// A memory manager to hide the underlying type of the memory buffer.
///
/// Both variants hand out word aligned memory, so any position that is a
/// multiple of eight can be viewed as a slice of `u64` sized records.
pub enum MemoryManager {
    /// A memory buffer.
    Mem(Vec<u64>),
    /// A memory mapped buffer.
    Spill(SpillFile),
}

impl MemoryManager {
    pub fn new_mem(size: usize) -> Self {
        MemoryManager::Mem(vec![0; words(size)])
    }

    /// Creates a buffer backed by an unnamed temporary file inside `dir`.
    pub fn new_spill<P: AsRef<Path>>(dir: P, size: usize) -> std::io::Result<Self> {
        let file = tempfile::tempfile_in(dir)?;
        file.set_len(size as u64)?;
        Ok(MemoryManager::Spill(SpillFile::from_file(file)?))
    }

    /// Returns the size of the buffer in bytes.
    pub fn len(&self) -> usize {
        match self {
            MemoryManager::Mem(vec) => vec.len() * WORD,
            MemoryManager::Spill(spill) => spill.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_ptr(&self) -> *const u8 {
        match self {
            MemoryManager::Mem(vec) => vec.as_ptr() as *const u8,
            MemoryManager::Spill(spill) => spill.mmap.as_ptr(),
        }
    }

    fn as_mut_ptr(&mut self) -> *mut u8 {
        match self {
            MemoryManager::Mem(vec) => vec.as_mut_ptr() as *mut u8,
            MemoryManager::Spill(spill) => spill.mmap.as_mut_ptr(),
        }
    }

    /// # Safety
    ///
    /// `T` must be plain old data, `pos` aligned for `T`, and
    /// `pos..pos + count * size_of::<T>()` inside the buffer.
    pub unsafe fn as_slice<T>(&self, pos: usize, count: usize) -> &[T] {
        if count == 0 {
            return &[];
        }
        debug_assert!(pos % align_of::<T>() == 0);
        debug_assert!(pos + count * size_of::<T>() <= self.len());
        std::slice::from_raw_parts(self.as_ptr().add(pos) as *const T, count)
    }

    /// # Safety
    ///
    /// See [`as_slice`](MemoryManager::as_slice).
    pub unsafe fn copy_from_slice<T>(&mut self, pos: usize, src: &[T]) {
        if src.is_empty() {
            return;
        }
        debug_assert!(pos % align_of::<T>() == 0);
        debug_assert!(pos + src.len() * size_of::<T>() <= self.len());
        std::ptr::copy(src.as_ptr(), self.as_mut_ptr().add(pos) as *mut T, src.len())
    }
}

fn words(size: usize) -> usize {
    (size + WORD - 1) / WORD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_len() {
        assert_eq!(MemoryManager::new_mem(0).len(), 0);
        assert!(MemoryManager::new_mem(0).is_empty());
        assert_eq!(MemoryManager::new_mem(5).len(), 8);
        assert_eq!(MemoryManager::Mem(vec![1, 2]).len(), 16);
    }

    #[test]
    fn test_mem() {
        let mut mm = MemoryManager::new_mem(4 * WORD);
        unsafe {
            mm.copy_from_slice::<u64>(WORD, &[3, 2, 1]);
        }
        assert_eq!(unsafe { mm.as_slice::<u64>(0, 4) }, &[0, 3, 2, 1]);
        assert_eq!(unsafe { mm.as_slice::<u64>(0, 0) }, &[] as &[u64]);
    }

    #[test]
    fn test_spill() {
        let dir = tempfile::tempdir().unwrap();
        let mut mm = MemoryManager::new_spill(dir.path(), 3 * WORD).unwrap();
        assert_eq!(mm.len(), 3 * WORD);
        assert_eq!(unsafe { mm.as_slice::<u64>(0, 3) }, &[0; 3]);
        unsafe {
            mm.copy_from_slice::<u64>(WORD, &[7, 9]);
        }
        assert_eq!(unsafe { mm.as_slice::<u64>(0, 3) }, &[0, 7, 9]);
        assert!(MemoryManager::new_spill(dir.path(), 0).unwrap().is_empty());
        assert!(MemoryManager::new_spill(dir.path().join("missing"), 8).is_err());
    }
}
