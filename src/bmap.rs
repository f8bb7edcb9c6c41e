//! Logical offset -> physical block.
//! Logical blocks 0..NDIRECT come from the inode's direct pointers, the next NINDIRECT
//! from the pointer array stored in the indirect block.

use super::*;
use bitmap::BitMap;
use disk::BlockStore;
use inode::Inode;

/// Grab the lowest free data block and zero it.
fn balloc(store: &mut BlockStore) -> Result<usize> {
    let bno = BitMap::blocks().alloc(store)?;
    store.zero_block(bno)?;
    Ok(bno)
}

fn bfree(store: &mut BlockStore, bno: usize) -> Result<()> {
    BitMap::blocks().dealloc(store, bno)
}

/// Physical block behind logical block `lbn`, without allocating. `None` for a hole.
pub fn lookup(store: &BlockStore, inode: &Inode, lbn: usize) -> Result<Option<usize>> {
    if lbn >= MAXFILE {
        return Err(FsError::FileTooLarge(lbn * BSIZE));
    }
    let bno = if lbn < NDIRECT {
        inode.direct[lbn]
    } else if inode.indirect == 0 {
        0
    } else {
        store.read_ptr(inode.indirect, lbn - NDIRECT)?
    };
    Ok((bno != 0).then_some(bno))
}

/// Map byte `offset` of an inode to its block, failing on holes. Never allocates.
pub fn bmap_read(store: &BlockStore, inode: &Inode, offset: usize) -> Result<usize> {
    let lbn = offset / BSIZE;
    if lbn >= MAXFILE {
        return Err(FsError::FileTooLarge(offset));
    }
    lookup(store, inode, lbn)?.ok_or(FsError::HoleNotAllocated(lbn))
}

/// Map byte `offset` of `inode` to a physical block.
///
/// With `extend`, missing blocks (and the indirect block) are allocated and recorded in
/// `inode`; the caller is responsible for writing the inode back. Without it, a missing
/// block is `HoleNotAllocated`. A failed call leaves the bitmaps and `inode` as they were.
pub fn bmap(store: &mut BlockStore, inode: &mut Inode, offset: usize, extend: bool) -> Result<usize> {
    let lbn = offset / BSIZE;
    if lbn >= MAXFILE {
        return Err(FsError::FileTooLarge(offset));
    }
    if let Some(bno) = lookup(store, inode, lbn)? {
        log::trace!("bmap {} -> {}", offset, bno);
        return Ok(bno);
    }
    if !extend {
        return Err(FsError::HoleNotAllocated(lbn));
    }

    if lbn < NDIRECT {
        let bno = balloc(store)?;
        inode.direct[lbn] = bno;
        log::trace!("bmap {} -> {} (new direct)", offset, bno);
        return Ok(bno);
    }

    let fresh_indirect = inode.indirect == 0;
    if fresh_indirect {
        inode.indirect = balloc(store)?;
    }
    match balloc(store) {
        Ok(bno) => {
            store.write_ptr(inode.indirect, lbn - NDIRECT, bno)?;
            log::trace!("bmap {} -> {} (new, via {})", offset, bno, inode.indirect);
            Ok(bno)
        }
        Err(err) => {
            if fresh_indirect {
                bfree(store, inode.indirect)?;
                inode.indirect = 0;
            }
            Err(err)
        }
    }
}

/// # of blocks that extending `inode` over bytes `start..end` would allocate,
/// counting the indirect block itself.
pub fn blocks_needed(store: &BlockStore, inode: &Inode, start: usize, end: usize) -> Result<usize> {
    if end <= start {
        return Ok(0);
    }
    let mut needed = 0;
    let mut needs_indirect = false;
    for lbn in start / BSIZE..=(end - 1) / BSIZE {
        if lookup(store, inode, lbn)?.is_none() {
            needed += 1;
            needs_indirect |= lbn >= NDIRECT && inode.indirect == 0;
        }
    }
    Ok(needed + needs_indirect as usize)
}

/// Data blocks held by `inode`, the indirect block included.
pub fn blocks_held(store: &BlockStore, inode: &Inode) -> Result<usize> {
    let mut held = inode.direct.iter().filter(|&&bno| bno != 0).count();
    if inode.indirect != 0 {
        held += 1;
        for slot in 0..NINDIRECT {
            if store.read_ptr(inode.indirect, slot)? != 0 {
                held += 1;
            }
        }
    }
    Ok(held)
}

/// Release every data block of `inode` and reset its size. The caller writes it back.
pub fn itrunc(store: &mut BlockStore, inode: &mut Inode) -> Result<()> {
    for bno in inode.direct.iter_mut() {
        if *bno != 0 {
            bfree(store, *bno)?;
            *bno = 0;
        }
    }
    if inode.indirect != 0 {
        for slot in 0..NINDIRECT {
            let bno = store.read_ptr(inode.indirect, slot)?;
            if bno != 0 {
                bfree(store, bno)?;
            }
        }
        bfree(store, inode.indirect)?;
        inode.indirect = 0;
    }
    inode.size = 0;
    Ok(())
}
