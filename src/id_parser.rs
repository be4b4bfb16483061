//! Packing of `(fid, label, offset)` into one vertex id.

use crate::types::{FId, VId, VLabel};

const ID_BITS: u32 = (std::mem::size_of::<VId>() * 8) as u32;

/// The number of bits needed to tell apart `n` values, at least one.
fn bit_width(n: usize) -> u32 {
    if n <= 2 {
        1
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

/// Encodes and decodes vertex ids.
///
/// ```text
/// +-----------+-------------+-----------------------------+
/// |    fid    |    label    |           offset            |
/// +-----------+-------------+-----------------------------+
///  MSB                                                 LSB
/// ```
///
/// A global id carries the owning fragment in `fid`, a local id has `fid`
/// set to zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdParser {
    fnum: usize,
    label_num: usize,
    fid_offset: u32,
    label_offset: u32,
    label_mask: VId,
    offset_mask: VId,
}

impl IdParser {
    pub fn new(fnum: usize, label_num: usize) -> Self {
        assert!(fnum > 0, "fnum must be positive");
        assert!(label_num > 0, "label_num must be positive");
        let fid_offset = ID_BITS - bit_width(fnum);
        let label_offset = fid_offset - bit_width(label_num);
        Self {
            fnum,
            label_num,
            fid_offset,
            label_offset,
            label_mask: ((1 << (fid_offset - label_offset)) - 1) << label_offset,
            offset_mask: (1 << label_offset) - 1,
        }
    }

    pub fn fnum(&self) -> usize {
        self.fnum
    }

    pub fn label_num(&self) -> usize {
        self.label_num
    }

    /// The largest offset representable for any label.
    pub fn max_offset(&self) -> VId {
        self.offset_mask
    }

    pub fn generate_id(&self, fid: FId, label: VLabel, offset: VId) -> VId {
        assert!(fid < self.fnum, "fid {} out of range", fid);
        assert!(label < self.label_num, "label {} out of range", label);
        assert!(offset <= self.offset_mask, "offset {} out of range", offset);
        ((fid as VId) << self.fid_offset) | ((label as VId) << self.label_offset) | offset
    }

    pub fn get_fid(&self, id: VId) -> FId {
        (id >> self.fid_offset) as FId
    }

    pub fn get_label(&self, id: VId) -> VLabel {
        ((id & self.label_mask) >> self.label_offset) as VLabel
    }

    pub fn get_offset(&self, id: VId) -> VId {
        id & self.offset_mask
    }

    pub fn parse(&self, id: VId) -> (FId, VLabel, VId) {
        (self.get_fid(id), self.get_label(id), self.get_offset(id))
    }

    /// Strips the fragment bits of a global id.
    pub fn lid(&self, gid: VId) -> VId {
        gid & (self.label_mask | self.offset_mask)
    }

    /// Attaches the fragment bits to a local id.
    pub fn gid(&self, fid: FId, lid: VId) -> VId {
        assert!(fid < self.fnum, "fid {} out of range", fid);
        ((fid as VId) << self.fid_offset) | self.lid(lid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bit_width() {
        assert_eq!(bit_width(1), 1);
        assert_eq!(bit_width(2), 1);
        assert_eq!(bit_width(3), 2);
        assert_eq!(bit_width(4), 2);
        assert_eq!(bit_width(5), 3);
        assert_eq!(bit_width(1024), 10);
    }

    #[test]
    fn test_layout() {
        let parser = IdParser::new(4, 3);
        assert_eq!(parser.max_offset(), (1 << 60) - 1);
        let id = parser.generate_id(3, 2, 5);
        assert_eq!(id, (3 << 62) | (2 << 60) | 5);
        assert_eq!(parser.parse(id), (3, 2, 5));
        assert_eq!(parser.lid(id), (2 << 60) | 5);
        assert_eq!(parser.gid(3, parser.lid(id)), id);
    }

    #[test]
    fn test_single_fragment_single_label() {
        let parser = IdParser::new(1, 1);
        let id = parser.generate_id(0, 0, parser.max_offset());
        assert_eq!(parser.parse(id), (0, 0, parser.max_offset()));
        assert_eq!(parser.lid(id), id);
    }

    #[test]
    #[should_panic]
    fn test_label_out_of_range() {
        IdParser::new(2, 2).generate_id(0, 2, 0);
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            fnum in 1usize..64,
            label_num in 1usize..32,
            fid_seed in any::<usize>(),
            label_seed in any::<usize>(),
            offset_seed in any::<u64>(),
        ) {
            let parser = IdParser::new(fnum, label_num);
            let (fid, label) = (fid_seed % fnum, label_seed % label_num);
            let offset = offset_seed & parser.max_offset();
            let id = parser.generate_id(fid, label, offset);
            prop_assert_eq!(parser.parse(id), (fid, label, offset));
            prop_assert_eq!(parser.gid(fid, parser.lid(id)), id);
        }
    }
}
