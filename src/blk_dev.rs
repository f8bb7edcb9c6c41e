use super::*;

use std::sync::Mutex;

/// # of BSIZE blocks in a whole image, metadata regions included
pub const DEV_BLOCKS: usize = DISK_SIZE / BSIZE;

/// Where an image lives between mounts. Blocks are numbered from the start of the image.
pub trait BlockDevice: Send + Sync {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) -> Result<()>;
    fn write_block(&self, blockno: usize, buf: &[u8]) -> Result<()>;
}

/// A device backed by memory.
pub struct MemDevice {
    data: Mutex<Vec<u8>>,
}

impl Default for MemDevice {
    fn default() -> Self {
        Self {
            data: Mutex::new(vec![0; DISK_SIZE]),
        }
    }
}

impl MemDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn range(blockno: usize, len: usize) -> Result<std::ops::Range<usize>> {
        if blockno >= DEV_BLOCKS || len != BSIZE {
            return Err(FsError::OutOfRange {
                index: blockno,
                limit: DEV_BLOCKS,
            });
        }
        Ok(blockno * BSIZE..(blockno + 1) * BSIZE)
    }
}

impl BlockDevice for MemDevice {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) -> Result<()> {
        let range = Self::range(blockno, buf.len())?;
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        buf.copy_from_slice(&data[range]);
        Ok(())
    }

    fn write_block(&self, blockno: usize, buf: &[u8]) -> Result<()> {
        let range = Self::range(blockno, buf.len())?;
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data[range].copy_from_slice(buf);
        Ok(())
    }
}
