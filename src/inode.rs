use super::*;
use bitmap::BitMap;
use disk::BlockStore;

use serde::{Deserialize, Serialize};

const KIND_SHIFT: u32 = 15;
const SIZE_MASK: u16 = (1 << SIZE_BITS) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File = 0,
    Directory = 1,
}

/// Pack a kind and a size into the on-disk 16-bit field.
pub fn encode(kind: FileKind, size: usize) -> Result<u16> {
    if size > MAX_SIZE_FIELD {
        return Err(FsError::SizeOverflow(size));
    }
    Ok(((kind as u16) << KIND_SHIFT) | size as u16)
}

/// Reverse of [`encode`]. Reserved bits 13 and 14 are ignored.
pub fn decode(raw: u16) -> (FileKind, usize) {
    let kind = if raw >> KIND_SHIFT == 0 {
        FileKind::File
    } else {
        FileKind::Directory
    };
    (kind, (raw & SIZE_MASK) as usize)
}

/// inode on disk
#[repr(C)]
#[derive(Serialize, Deserialize, Default)]
struct DiskInode {
    /// Bit 15: kind, bits 12..=0: size in bytes
    type_size: u16,
    /// Data block addresses
    direct: [u32; NDIRECT],
    /// Block of further block addresses
    indirect: u32,
    _pad: [u8; INODE_SIZE - 14],
}

/// inode in memory. Block pointers of 0 mean "no block".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub kind: FileKind,
    pub size: usize,
    pub direct: [usize; NDIRECT],
    pub indirect: usize,
}

impl Inode {
    pub fn new(kind: FileKind) -> Self {
        Self {
            kind,
            size: 0,
            direct: [0; NDIRECT],
            indirect: 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    fn to_disk(self) -> Result<DiskInode> {
        let mut direct = [0u32; NDIRECT];
        for (dst, &src) in direct.iter_mut().zip(self.direct.iter()) {
            *dst = src as u32;
        }
        Ok(DiskInode {
            type_size: encode(self.kind, self.size)?,
            direct,
            indirect: self.indirect as u32,
            _pad: Default::default(),
        })
    }

    fn from_disk(dinode: &DiskInode) -> Self {
        let (kind, size) = decode(dinode.type_size);
        let mut direct = [0usize; NDIRECT];
        for (dst, &src) in direct.iter_mut().zip(dinode.direct.iter()) {
            *dst = src as usize;
        }
        Self {
            kind,
            size,
            direct,
            indirect: dinode.indirect as usize,
        }
    }
}

/// The inode region, indexed by inode number. Liveness comes from the inode bitmap.
pub struct InodeTable;

impl InodeTable {
    fn check_live(store: &BlockStore, ino: usize) -> Result<()> {
        if ino >= NINODES || !BitMap::inodes().is_allocated(store, ino)? {
            return Err(FsError::InvalidInode(ino));
        }
        Ok(())
    }

    pub fn read(store: &BlockStore, ino: usize) -> Result<Inode> {
        Self::check_live(store, ino)?;
        let dinode: DiskInode = bincode::deserialize(store.inode_slot(ino))?;
        Ok(Inode::from_disk(&dinode))
    }

    /// Overwrite a live inode. The root must stay a directory.
    pub fn write(store: &mut BlockStore, ino: usize, inode: &Inode) -> Result<()> {
        Self::check_live(store, ino)?;
        if ino == ROOTINO && !inode.is_dir() {
            return Err(FsError::InvalidInode(ino));
        }
        Self::put(store, ino, inode)
    }

    fn put(store: &mut BlockStore, ino: usize, inode: &Inode) -> Result<()> {
        // encode before touching the slot so a bad size leaves it intact
        let dinode = inode.to_disk()?;
        bincode::serialize_into(store.inode_slot_mut(ino), &dinode)?;
        Ok(())
    }

    /// Take the lowest free inode number and give it a fresh, empty inode of `kind`.
    pub fn alloc(store: &mut BlockStore, kind: FileKind) -> Result<usize> {
        let ino = BitMap::inodes().alloc(store)?;
        Self::put(store, ino, &Inode::new(kind))?;
        log::debug!("ialloc {} {:?}", ino, kind);
        Ok(ino)
    }

    /// Release inode `ino`. The caller must already have released its data blocks.
    pub fn free(store: &mut BlockStore, ino: usize) -> Result<()> {
        if ino == ROOTINO {
            return Err(FsError::InvalidInode(ino));
        }
        Self::check_live(store, ino)?;
        store.inode_slot_mut(ino).fill(0);
        BitMap::inodes().dealloc(store, ino)
    }

    /// Write inode 0 as an empty directory. Only used while formatting.
    pub(crate) fn init_root(store: &mut BlockStore) -> Result<()> {
        BitMap::inodes().reserve(store, ROOTINO)?;
        Self::put(store, ROOTINO, &Inode::new(FileKind::Directory))
    }
}
