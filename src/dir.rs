use super::*;
use bmap::{bmap, bmap_read};
use disk::BlockStore;
use inode::{Inode, InodeTable};

use serde::{Deserialize, Serialize};

/// One slot of a directory. `inum == 0` marks a free slot.
#[repr(C)]
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct DirEnt {
    /// NUL-padded, not NUL-terminated when all DIRSIZ bytes are used
    name: [u8; DIRSIZ],
    inum: u8,
}

impl DirEnt {
    pub fn new(name: &str, inum: usize) -> Result<Self> {
        let key = name_key(name)?;
        // 0 marks a free slot, so the root can never be a child
        let inum = match u8::try_from(inum) {
            Ok(inum) if inum != 0 && (inum as usize) < NINODES => inum,
            _ => return Err(FsError::InvalidInode(inum)),
        };
        Ok(Self { name: key, inum })
    }

    pub fn is_free(&self) -> bool {
        self.inum == 0
    }

    pub fn inum(&self) -> usize {
        self.inum as usize
    }

    pub fn name(&self) -> String {
        let len = self.name.iter().position(|&c| c == 0).unwrap_or(DIRSIZ);
        String::from_utf8_lossy(&self.name[..len]).into_owned()
    }
}

/// Validate `name` and pad it to the on-disk width.
fn name_key(name: &str) -> Result<[u8; DIRSIZ]> {
    let bytes = name.as_bytes();
    if bytes.len() > DIRSIZ {
        return Err(FsError::NameTooLong(bytes.len()));
    }
    if bytes.is_empty() || bytes.contains(&b'/') || bytes.contains(&0) {
        return Err(FsError::InvalidName(name.to_string()));
    }
    let mut key = [0u8; DIRSIZ];
    key[..bytes.len()].copy_from_slice(bytes);
    Ok(key)
}

/// Name -> inode number bindings stored as a flat array of `DirEnt`s in a directory's blocks.
/// A directory's size is always a whole number of entries.
pub struct Directory;

impl Directory {
    fn open(store: &BlockStore, dir: usize) -> Result<Inode> {
        let inode = InodeTable::read(store, dir)?;
        if !inode.is_dir() {
            return Err(FsError::NotADirectory(dir));
        }
        Ok(inode)
    }

    fn read_ent(store: &BlockStore, inode: &Inode, off: usize) -> Result<DirEnt> {
        let bno = bmap_read(store, inode, off)?;
        let at = off % BSIZE;
        Ok(bincode::deserialize(&store.block(bno)?[at..at + DIRENT_SIZE])?)
    }

    fn write_ent(store: &mut BlockStore, bno: usize, off: usize, ent: &DirEnt) -> Result<()> {
        let at = off % BSIZE;
        bincode::serialize_into(&mut store.block_mut(bno)?[at..at + DIRENT_SIZE], ent)?;
        Ok(())
    }

    /// Offset of the live entry called `key`, if any.
    fn find(
        store: &BlockStore,
        inode: &Inode,
        key: &[u8; DIRSIZ],
    ) -> Result<Option<(usize, DirEnt)>> {
        for off in (0..inode.size).step_by(DIRENT_SIZE) {
            let ent = Self::read_ent(store, inode, off)?;
            if !ent.is_free() && &ent.name == key {
                return Ok(Some((off, ent)));
            }
        }
        Ok(None)
    }

    pub fn lookup(store: &BlockStore, dir: usize, name: &str) -> Result<usize> {
        let key = name_key(name)?;
        let inode = Self::open(store, dir)?;
        match Self::find(store, &inode, &key)? {
            Some((_, ent)) => Ok(ent.inum()),
            None => Err(FsError::NotFound(name.to_string())),
        }
    }

    /// Bind `name` to `inum` in `dir`, reusing the first free slot or growing the directory.
    pub fn insert(store: &mut BlockStore, dir: usize, name: &str, inum: usize) -> Result<()> {
        let ent = DirEnt::new(name, inum)?;
        let mut inode = Self::open(store, dir)?;
        if Self::find(store, &inode, &ent.name)?.is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }

        let mut slot = None;
        for off in (0..inode.size).step_by(DIRENT_SIZE) {
            if Self::read_ent(store, &inode, off)?.is_free() {
                slot = Some(off);
                break;
            }
        }

        let off = match slot {
            Some(off) => off,
            None => {
                if inode.size + DIRENT_SIZE > MAX_FILE_SIZE {
                    return Err(FsError::DirectoryFull(dir));
                }
                inode.size
            }
        };
        // a new block past the end comes back zeroed, i.e. all slots free
        let bno = bmap(store, &mut inode, off, true)?;
        Self::write_ent(store, bno, off, &ent)?;
        inode.size = inode.size.max(off + DIRENT_SIZE);
        InodeTable::write(store, dir, &inode)?;
        log::debug!("dir {}: link {:?} -> {}", dir, name, inum);
        Ok(())
    }

    /// Unbind `name`, returning the inode number it pointed to.
    pub fn remove(store: &mut BlockStore, dir: usize, name: &str) -> Result<usize> {
        let key = name_key(name)?;
        let inode = Self::open(store, dir)?;
        let (off, ent) = Self::find(store, &inode, &key)?
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;
        let bno = bmap_read(store, &inode, off)?;
        Self::write_ent(store, bno, off, &DirEnt::default())?;
        log::debug!("dir {}: unlink {:?}", dir, name);
        Ok(ent.inum())
    }

    /// Live entries in slot order.
    pub fn entries(store: &BlockStore, dir: usize) -> Result<Vec<(String, usize)>> {
        let inode = Self::open(store, dir)?;
        let mut out = Vec::new();
        for off in (0..inode.size).step_by(DIRENT_SIZE) {
            let ent = Self::read_ent(store, &inode, off)?;
            if !ent.is_free() {
                out.push((ent.name(), ent.inum()));
            }
        }
        Ok(out)
    }

    pub fn is_empty(store: &BlockStore, dir: usize) -> Result<bool> {
        Ok(Self::entries(store, dir)?.is_empty())
    }
}
