//! The image arena. One owned buffer, addressed only by indices:
//! byte offsets for the bitmap and inode regions, block numbers for the data region.

use super::*;

pub struct BlockStore {
    image: Vec<u8>,
}

impl Default for BlockStore {
    fn default() -> Self {
        BlockStore {
            image: vec![0; DISK_SIZE],
        }
    }
}

impl BlockStore {
    /// A zero-filled image.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt an existing image. The buffer must be exactly `DISK_SIZE` bytes.
    pub fn from_image(image: Vec<u8>) -> Result<Self> {
        if image.len() != DISK_SIZE {
            return Err(FsError::BadImage(format!(
                "image is {} bytes, expected {}",
                image.len(),
                DISK_SIZE
            )));
        }
        Ok(Self { image })
    }

    pub fn into_image(self) -> Vec<u8> {
        self.image
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// # of blocks in the data region, including the reserved block 0
    pub fn total_blocks(&self) -> usize {
        NBLOCKS
    }

    fn block_range(&self, bno: usize) -> Result<std::ops::Range<usize>> {
        if bno >= NBLOCKS {
            return Err(FsError::OutOfRange {
                index: bno,
                limit: NBLOCKS,
            });
        }
        let start = DATA_START + bno * BSIZE;
        Ok(start..start + BSIZE)
    }

    pub fn block(&self, bno: usize) -> Result<&[u8]> {
        let range = self.block_range(bno)?;
        Ok(&self.image[range])
    }

    pub fn block_mut(&mut self, bno: usize) -> Result<&mut [u8]> {
        let range = self.block_range(bno)?;
        Ok(&mut self.image[range])
    }

    pub fn zero_block(&mut self, bno: usize) -> Result<()> {
        self.block_mut(bno)?.fill(0);
        Ok(())
    }

    /// Read pointer `slot` of a block interpreted as an array of block pointers.
    pub fn read_ptr(&self, bno: usize, slot: usize) -> Result<usize> {
        if slot >= NINDIRECT {
            return Err(FsError::OutOfRange {
                index: slot,
                limit: NINDIRECT,
            });
        }
        let off = slot * PTR_SIZE;
        let raw = &self.block(bno)?[off..off + PTR_SIZE];
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize)
    }

    pub fn write_ptr(&mut self, bno: usize, slot: usize, ptr: usize) -> Result<()> {
        if slot >= NINDIRECT {
            return Err(FsError::OutOfRange {
                index: slot,
                limit: NINDIRECT,
            });
        }
        let off = slot * PTR_SIZE;
        self.block_mut(bno)?[off..off + PTR_SIZE].copy_from_slice(&(ptr as u32).to_le_bytes());
        Ok(())
    }

    /// bitmaps and super block
    pub(crate) fn meta(&self) -> &[u8] {
        &self.image[..INODE_START]
    }

    pub(crate) fn meta_mut(&mut self) -> &mut [u8] {
        &mut self.image[..INODE_START]
    }

    /// the raw record of inode `ino`; bounds are checked by the inode table
    pub(crate) fn inode_slot(&self, ino: usize) -> &[u8] {
        let start = INODE_START + ino * INODE_SIZE;
        &self.image[start..start + INODE_SIZE]
    }

    pub(crate) fn inode_slot_mut(&mut self, ino: usize) -> &mut [u8] {
        let start = INODE_START + ino * INODE_SIZE;
        &mut self.image[start..start + INODE_SIZE]
    }
}
