use super::*;
use disk::BlockStore;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapKind {
    Inode,
    Block,
}

impl fmt::Display for BitmapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitmapKind::Inode => write!(f, "inode"),
            BitmapKind::Block => write!(f, "block"),
        }
    }
}

/// One of the two bitmaps in the bitmap region. Bit i set => unit i is allocated.
/// Bit 0 is reserved at format time, so 0 is never handed out.
pub struct BitMap {
    kind: BitmapKind,
    /// byte offset inside the bitmap region
    start: usize,
    /// # of usable bits
    bits: usize,
}

impl BitMap {
    pub fn of(kind: BitmapKind) -> Self {
        match kind {
            BitmapKind::Inode => Self {
                kind,
                start: INODE_BMAP_START,
                bits: NINODES,
            },
            BitmapKind::Block => Self {
                kind,
                start: BLOCK_BMAP_START,
                bits: NBLOCKS,
            },
        }
    }

    pub fn inodes() -> Self {
        Self::of(BitmapKind::Inode)
    }

    pub fn blocks() -> Self {
        Self::of(BitmapKind::Block)
    }

    pub fn capacity(&self) -> usize {
        self.bits
    }

    fn locate(&self, index: usize) -> Result<(usize, u8)> {
        if index >= self.bits {
            return Err(FsError::OutOfRange {
                index,
                limit: self.bits,
            });
        }
        let byte = self.start + index / 8;
        let mask = 1 << (index % 8);
        Ok((byte, mask))
    }

    /// Reserve the lowest-numbered clear bit and return its index.
    pub fn alloc(&self, store: &mut BlockStore) -> Result<usize> {
        let meta = store.meta_mut();
        for index in 0..self.bits {
            let byte = self.start + index / 8;
            let mask = 1 << (index % 8);
            if meta[byte] & mask == 0 {
                meta[byte] |= mask;
                log::debug!("alloc {} {}", self.kind, index);
                return Ok(index);
            }
        }
        Err(FsError::ExhaustedSpace(self.kind))
    }

    /// Clear bit `index`. Freeing a clear bit or the reserved bit 0 is an error,
    /// and leaves the bitmap alone.
    pub fn dealloc(&self, store: &mut BlockStore, index: usize) -> Result<()> {
        if index == 0 {
            return Err(FsError::OutOfRange {
                index,
                limit: self.bits,
            });
        }
        let (byte, mask) = self.locate(index)?;
        let meta = store.meta_mut();
        if meta[byte] & mask == 0 {
            return Err(FsError::DoubleFree {
                kind: self.kind,
                index,
            });
        }
        meta[byte] &= !mask;
        log::debug!("free {} {}", self.kind, index);
        Ok(())
    }

    pub fn is_allocated(&self, store: &BlockStore, index: usize) -> Result<bool> {
        let (byte, mask) = self.locate(index)?;
        Ok(store.meta()[byte] & mask != 0)
    }

    /// Set bit `index` unconditionally. Only used while formatting.
    pub(crate) fn reserve(&self, store: &mut BlockStore, index: usize) -> Result<()> {
        let (byte, mask) = self.locate(index)?;
        store.meta_mut()[byte] |= mask;
        Ok(())
    }

    pub fn count_allocated(&self, store: &BlockStore) -> usize {
        let meta = store.meta();
        (0..self.bits)
            .filter(|&index| meta[self.start + index / 8] & (1 << (index % 8)) != 0)
            .count()
    }

    pub fn count_free(&self, store: &BlockStore) -> usize {
        self.capacity() - self.count_allocated(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> BlockStore {
        let mut store = BlockStore::new();
        BitMap::inodes().reserve(&mut store, 0).unwrap();
        BitMap::blocks().reserve(&mut store, 0).unwrap();
        store
    }

    #[test]
    fn allocates_lowest_free_first() {
        let mut store = fresh();
        let bmap = BitMap::blocks();
        assert_eq!(bmap.alloc(&mut store).unwrap(), 1);
        assert_eq!(bmap.alloc(&mut store).unwrap(), 2);
        assert_eq!(bmap.alloc(&mut store).unwrap(), 3);
        bmap.dealloc(&mut store, 2).unwrap();
        assert!(!bmap.is_allocated(&store, 2).unwrap());
        assert_eq!(bmap.alloc(&mut store).unwrap(), 2);
        assert_eq!(bmap.alloc(&mut store).unwrap(), 4);
    }

    #[test]
    fn kinds_do_not_share_bits() {
        let mut store = fresh();
        assert_eq!(BitMap::inodes().alloc(&mut store).unwrap(), 1);
        assert_eq!(BitMap::blocks().alloc(&mut store).unwrap(), 1);
        assert_eq!(BitMap::inodes().count_allocated(&store), 2);
        assert_eq!(BitMap::blocks().count_allocated(&store), 2);
    }

    #[test]
    fn count_tracks_allocs_minus_frees() {
        let mut store = fresh();
        let bmap = BitMap::inodes();
        let mut live = Vec::new();
        for round in 0..40 {
            if round % 3 == 2 {
                let ino = live.remove(live.len() / 2);
                bmap.dealloc(&mut store, ino).unwrap();
            } else {
                live.push(bmap.alloc(&mut store).unwrap());
            }
            assert_eq!(bmap.count_allocated(&store), live.len() + 1);
        }
    }

    #[test]
    fn exhaustion_leaves_bitmap_unchanged() {
        let mut store = fresh();
        let bmap = BitMap::inodes();
        for _ in 1..NINODES {
            bmap.alloc(&mut store).unwrap();
        }
        let before = store.meta().to_vec();
        assert!(matches!(
            bmap.alloc(&mut store),
            Err(FsError::ExhaustedSpace(BitmapKind::Inode))
        ));
        assert_eq!(store.meta(), &before[..]);
        assert_eq!(bmap.count_free(&store), 0);
    }

    #[test]
    fn reserved_bit_cannot_be_freed() {
        let mut store = fresh();
        for bmap in [BitMap::inodes(), BitMap::blocks()] {
            let before = store.meta().to_vec();
            assert!(matches!(
                bmap.dealloc(&mut store, 0),
                Err(FsError::OutOfRange { index: 0, .. })
            ));
            assert_eq!(store.meta(), &before[..]);
            assert!(bmap.is_allocated(&store, 0).unwrap());
            assert_eq!(bmap.alloc(&mut store).unwrap(), 1);
        }
    }

    #[test]
    fn double_free_is_rejected() {
        let mut store = fresh();
        let bmap = BitMap::blocks();
        let bno = bmap.alloc(&mut store).unwrap();
        bmap.dealloc(&mut store, bno).unwrap();
        assert!(matches!(
            bmap.dealloc(&mut store, bno),
            Err(FsError::DoubleFree { index, .. }) if index == bno
        ));
        assert!(matches!(
            bmap.dealloc(&mut store, NBLOCKS),
            Err(FsError::OutOfRange { .. })
        ));
    }
}
