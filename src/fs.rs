use super::*;
use bitmap::{BitMap, BitmapKind};
use blk_dev::{BlockDevice, DEV_BLOCKS};
use bmap::{bmap, bmap_read, blocks_held, blocks_needed, itrunc};
use dir::Directory;
use disk::BlockStore;
use inode::{FileKind, InodeTable};

use serde::{Deserialize, Serialize};

/// Lives in the bitmap region, right after the two bitmaps.
#[repr(C)]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    /// Must be FSMAGIC
    pub magic: u32,
    /// Size of file system image (bytes)
    pub size: u32,
    /// Block size (bytes)
    pub bsize: u32,
    /// Number of inodes
    pub ninodes: u32,
    /// Number of data blocks
    pub nblocks: u32,
    /// Byte offset of the inode table
    pub inodestart: u32,
    /// Byte offset of the first data block
    pub datastart: u32,
}

impl Default for SuperBlock {
    fn default() -> Self {
        SuperBlock {
            magic: FSMAGIC,
            size: DISK_SIZE as u32,
            bsize: BSIZE as u32,
            ninodes: NINODES as u32,
            nblocks: NBLOCKS as u32,
            inodestart: INODE_START as u32,
            datastart: DATA_START as u32,
        }
    }
}

impl SuperBlock {
    fn readsb(store: &BlockStore) -> Result<Self> {
        Ok(bincode::deserialize(&store.meta()[SB_START..])?)
    }

    fn writesb(&self, store: &mut BlockStore) -> Result<()> {
        bincode::serialize_into(&mut store.meta_mut()[SB_START..], self)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub ino: usize,
    pub kind: FileKind,
    /// bytes
    pub size: usize,
    /// data blocks held, the indirect block included
    pub blocks: usize,
}

/// A mounted image and the operations on it.
pub struct FileSystem {
    store: BlockStore,
    super_blk: SuperBlock,
}

impl FileSystem {
    /// A freshly formatted image: empty bitmaps with unit 0 reserved, and an empty root.
    pub fn format() -> Result<Self> {
        let mut store = BlockStore::new();
        let super_blk = SuperBlock::default();
        super_blk.writesb(&mut store)?;
        BitMap::blocks().reserve(&mut store, 0)?;
        InodeTable::init_root(&mut store)?;
        log::info!(
            "format: {} inodes, {} data blocks of {} bytes",
            NINODES,
            NBLOCKS,
            BSIZE
        );
        Ok(Self { store, super_blk })
    }

    /// Mount an existing image after checking its super block against this build's layout.
    pub fn open(image: Vec<u8>) -> Result<Self> {
        let store = BlockStore::from_image(image)?;
        let super_blk = SuperBlock::readsb(&store)?;
        if super_blk != SuperBlock::default() {
            log::warn!("rejecting image with super block {:?}", super_blk);
            return Err(FsError::BadImage(format!(
                "super block {:?} does not match this layout",
                super_blk
            )));
        }
        let reserved = BitMap::blocks().is_allocated(&store, 0)?;
        let root_ok = matches!(InodeTable::read(&store, ROOTINO), Ok(root) if root.is_dir());
        if !reserved || !root_ok {
            log::warn!("rejecting image without a reserved block 0 or root directory");
            return Err(FsError::BadImage("missing root directory".to_string()));
        }
        log::info!(
            "open: {} inodes and {} blocks in use",
            BitMap::inodes().count_allocated(&store),
            BitMap::blocks().count_allocated(&store)
        );
        Ok(Self { store, super_blk })
    }

    /// Read a whole image off `dev` and mount it.
    pub fn load(dev: &dyn BlockDevice) -> Result<Self> {
        let mut image = vec![0u8; DISK_SIZE];
        for (blockno, buf) in image.chunks_mut(BSIZE).enumerate() {
            dev.read_block(blockno, buf)?;
        }
        Self::open(image)
    }

    /// Write the whole image to `dev`.
    pub fn sync(&self, dev: &dyn BlockDevice) -> Result<()> {
        for (blockno, buf) in self.store.image().chunks(BSIZE).enumerate() {
            dev.write_block(blockno, buf)?;
        }
        log::debug!("sync: {} blocks written", DEV_BLOCKS);
        Ok(())
    }

    pub fn into_image(self) -> Vec<u8> {
        self.store.into_image()
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn super_blk(&self) -> &SuperBlock {
        &self.super_blk
    }

    pub fn free_inodes(&self) -> usize {
        BitMap::inodes().count_free(&self.store)
    }

    pub fn free_blocks(&self) -> usize {
        BitMap::blocks().count_free(&self.store)
    }

    pub fn lookup(&self, path: &str) -> Result<usize> {
        path::resolve(&self.store, path)
    }

    pub fn create(&mut self, path: &str) -> Result<usize> {
        self.make(path, FileKind::File)
    }

    pub fn mkdir(&mut self, path: &str) -> Result<usize> {
        self.make(path, FileKind::Directory)
    }

    fn make(&mut self, path: &str, kind: FileKind) -> Result<usize> {
        let (parent, name) = path::resolve_parent(&self.store, path)?;
        match Directory::lookup(&self.store, parent, name) {
            Ok(_) => return Err(FsError::AlreadyExists(name.to_string())),
            Err(FsError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }
        let ino = InodeTable::alloc(&mut self.store, kind)?;
        if let Err(err) = Directory::insert(&mut self.store, parent, name, ino) {
            InodeTable::free(&mut self.store, ino)?;
            return Err(err);
        }
        Ok(ino)
    }

    /// Read up to `buf.len()` bytes at `offset`. Returns the byte count, short at end of file.
    /// Unallocated blocks inside the file read as zeros.
    pub fn read_at(&self, ino: usize, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let inode = InodeTable::read(&self.store, ino)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory(ino));
        }
        if offset >= inode.size {
            return Ok(0);
        }
        let end = inode.size.min(offset + buf.len());
        let mut pos = offset;
        while pos < end {
            let at = pos % BSIZE;
            let n = (BSIZE - at).min(end - pos);
            let dst = &mut buf[pos - offset..pos - offset + n];
            match bmap_read(&self.store, &inode, pos) {
                Ok(bno) => dst.copy_from_slice(&self.store.block(bno)?[at..at + n]),
                Err(FsError::HoleNotAllocated(_)) => dst.fill(0),
                Err(err) => return Err(err),
            }
            pos += n;
        }
        Ok(end - offset)
    }

    /// Write `data` at `offset`, growing the file as needed. Either the whole write
    /// happens or, on error, nothing changes.
    pub fn write_at(&mut self, ino: usize, offset: usize, data: &[u8]) -> Result<usize> {
        let mut inode = InodeTable::read(&self.store, ino)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory(ino));
        }
        if data.is_empty() {
            return Ok(0);
        }
        let end = match offset.checked_add(data.len()) {
            Some(end) if end <= MAX_FILE_SIZE => end,
            _ => return Err(FsError::FileTooLarge(offset)),
        };
        if blocks_needed(&self.store, &inode, offset, end)? > self.free_blocks() {
            return Err(FsError::ExhaustedSpace(BitmapKind::Block));
        }

        let mut pos = offset;
        while pos < end {
            let bno = bmap(&mut self.store, &mut inode, pos, true)?;
            let at = pos % BSIZE;
            let n = (BSIZE - at).min(end - pos);
            self.store.block_mut(bno)?[at..at + n]
                .copy_from_slice(&data[pos - offset..pos - offset + n]);
            pos += n;
        }
        inode.size = inode.size.max(end);
        InodeTable::write(&mut self.store, ino, &inode)?;
        Ok(data.len())
    }

    pub fn read(&self, path: &str, offset: usize, len: usize) -> Result<Vec<u8>> {
        let ino = self.lookup(path)?;
        let mut buf = vec![0u8; len];
        let n = self.read_at(ino, offset, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    pub fn write(&mut self, path: &str, offset: usize, data: &[u8]) -> Result<usize> {
        let ino = self.lookup(path)?;
        self.write_at(ino, offset, data)
    }

    /// Drop every data block of a file.
    pub fn truncate(&mut self, path: &str) -> Result<()> {
        let ino = self.lookup(path)?;
        let mut inode = InodeTable::read(&self.store, ino)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory(ino));
        }
        itrunc(&mut self.store, &mut inode)?;
        InodeTable::write(&mut self.store, ino, &inode)
    }

    /// Remove a file or an empty directory and release everything it held.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let (parent, name) = path::resolve_parent(&self.store, path)?;
        let ino = Directory::lookup(&self.store, parent, name)?;
        let mut inode = InodeTable::read(&self.store, ino)?;
        if inode.is_dir() && !Directory::is_empty(&self.store, ino)? {
            return Err(FsError::DirectoryNotEmpty(ino));
        }
        Directory::remove(&mut self.store, parent, name)?;
        itrunc(&mut self.store, &mut inode)?;
        InodeTable::free(&mut self.store, ino)?;
        log::debug!("unlink {:?} (inode {})", path, ino);
        Ok(())
    }

    pub fn readdir(&self, path: &str) -> Result<Vec<(String, usize)>> {
        let ino = self.lookup(path)?;
        Directory::entries(&self.store, ino)
    }

    pub fn stat(&self, path: &str) -> Result<Stat> {
        let ino = self.lookup(path)?;
        let inode = InodeTable::read(&self.store, ino)?;
        Ok(Stat {
            ino,
            kind: inode.kind,
            size: inode.size,
            blocks: blocks_held(&self.store, &inode)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_reserves_zero_and_root() {
        let fs = FileSystem::format().unwrap();
        assert!(BitMap::inodes().is_allocated(fs.store(), 0).unwrap());
        assert!(BitMap::blocks().is_allocated(fs.store(), 0).unwrap());
        assert_eq!(fs.free_inodes(), NINODES - 1);
        assert_eq!(fs.free_blocks(), NBLOCKS - 1);
        let root = fs.stat("/").unwrap();
        assert_eq!(root.ino, ROOTINO);
        assert_eq!(root.kind, FileKind::Directory);
        assert_eq!(root.size, 0);
        assert_eq!(*fs.super_blk(), SuperBlock::default());
    }

    #[test]
    fn create_and_mkdir() {
        let mut fs = FileSystem::format().unwrap();
        let docs = fs.mkdir("/docs").unwrap();
        let a = fs.create("/docs/a.txt").unwrap();
        assert_eq!(fs.lookup("/docs/a.txt").unwrap(), a);
        assert_eq!(fs.readdir("/").unwrap(), vec![("docs".to_string(), docs)]);
        assert_eq!(fs.readdir("/docs").unwrap(), vec![("a.txt".to_string(), a)]);
        assert!(matches!(
            fs.create("/docs/a.txt"),
            Err(FsError::AlreadyExists(_))
        ));
        assert!(matches!(
            fs.create("/docs/a.txt/b"),
            Err(FsError::NotADirectory(ino)) if ino == a
        ));
        assert!(matches!(fs.mkdir("/"), Err(FsError::InvalidName(_))));
    }

    #[test]
    fn failed_create_releases_inode() {
        let mut fs = FileSystem::format().unwrap();
        let free = fs.free_inodes();
        assert!(matches!(
            fs.create("/this-name-is-too-long"),
            Err(FsError::NameTooLong(_))
        ));
        assert_eq!(fs.free_inodes(), free);

        for i in 1..NINODES {
            fs.create(&format!("/f{}", i)).unwrap();
        }
        let before = fs.store().image().to_vec();
        assert!(matches!(
            fs.create("/one-more"),
            Err(FsError::ExhaustedSpace(BitmapKind::Inode))
        ));
        assert_eq!(fs.store().image(), &before[..]);
    }

    #[test]
    fn reads_stop_at_size_and_fill_holes() {
        let mut fs = FileSystem::format().unwrap();
        let ino = fs.create("/sparse").unwrap();
        fs.write_at(ino, 3 * BSIZE, b"tail").unwrap();
        let st = fs.stat("/sparse").unwrap();
        assert_eq!(st.size, 3 * BSIZE + 4);
        // indirect block + one data block
        assert_eq!(st.blocks, 2);

        let data = fs.read("/sparse", 0, 4 * BSIZE).unwrap();
        assert_eq!(data.len(), 3 * BSIZE + 4);
        assert!(data[..3 * BSIZE].iter().all(|&b| b == 0));
        assert_eq!(&data[3 * BSIZE..], b"tail");
        assert!(fs.read("/sparse", 5 * BSIZE, 10).unwrap().is_empty());
    }

    #[test]
    fn write_limits() {
        let mut fs = FileSystem::format().unwrap();
        let ino = fs.create("/f").unwrap();
        assert_eq!(fs.write_at(ino, 0, &[1u8; MAX_FILE_SIZE]).unwrap(), MAX_FILE_SIZE);
        assert_eq!(fs.stat("/f").unwrap().size, MAX_FILE_SIZE);
        assert!(matches!(
            fs.write_at(ino, MAX_FILE_SIZE, b"x"),
            Err(FsError::FileTooLarge(_))
        ));
        assert!(matches!(
            fs.write("/", 0, b"x"),
            Err(FsError::IsADirectory(ROOTINO))
        ));
    }

    #[test]
    fn empty_write_does_not_grow_file() {
        let mut fs = FileSystem::format().unwrap();
        let ino = fs.create("/f").unwrap();
        assert_eq!(fs.write_at(ino, 5000, &[]).unwrap(), 0);
        assert_eq!(fs.stat("/f").unwrap().size, 0);
        assert_eq!(fs.stat("/f").unwrap().blocks, 0);

        fs.write_at(ino, 0, b"abc").unwrap();
        assert_eq!(fs.write_at(ino, 100, &[]).unwrap(), 0);
        assert_eq!(fs.stat("/f").unwrap().size, 3);
    }

    #[test]
    fn out_of_blocks_changes_nothing() {
        let mut fs = FileSystem::format().unwrap();
        // each full file holds 32 data blocks plus its indirect block
        let mut n = 0;
        while fs.free_blocks() >= 33 {
            let ino = fs.create(&format!("/big{}", n)).unwrap();
            fs.write_at(ino, 0, &[n as u8; MAX_FILE_SIZE]).unwrap();
            n += 1;
        }
        let ino = fs.create("/last").unwrap();
        let before = fs.store().image().to_vec();
        assert!(matches!(
            fs.write_at(ino, 0, &[0xee; MAX_FILE_SIZE]),
            Err(FsError::ExhaustedSpace(BitmapKind::Block))
        ));
        assert_eq!(fs.store().image(), &before[..]);

        fs.unlink("/big0").unwrap();
        fs.write_at(ino, 0, &[0xee; MAX_FILE_SIZE]).unwrap();
        assert_eq!(fs.read("/last", 0, 3).unwrap(), vec![0xee; 3]);
    }

    #[test]
    fn unlink_and_truncate_release_blocks() {
        let mut fs = FileSystem::format().unwrap();
        let (inodes, blocks) = (fs.free_inodes(), fs.free_blocks());
        fs.mkdir("/d").unwrap();
        fs.create("/d/f").unwrap();
        fs.write("/d/f", 0, &[9u8; 1000]).unwrap();

        assert!(matches!(fs.unlink("/d"), Err(FsError::DirectoryNotEmpty(_))));
        fs.truncate("/d/f").unwrap();
        assert_eq!(fs.stat("/d/f").unwrap().size, 0);
        assert_eq!(fs.stat("/d/f").unwrap().blocks, 0);

        fs.unlink("/d/f").unwrap();
        fs.unlink("/d").unwrap();
        assert!(matches!(fs.lookup("/d"), Err(FsError::NotFound(_))));
        assert_eq!(fs.free_inodes(), inodes);
        // the root keeps the block holding its (now free) entry slot
        assert_eq!(fs.free_blocks(), blocks - 1);
    }

    #[test]
    fn open_checks_the_image() {
        let mut fs = FileSystem::format().unwrap();
        fs.create("/keep").unwrap();
        let image = fs.into_image();

        let fs = FileSystem::open(image.clone()).unwrap();
        assert!(fs.lookup("/keep").is_ok());

        let mut bad = image.clone();
        bad[SB_START] ^= 0xff;
        assert!(matches!(FileSystem::open(bad), Err(FsError::BadImage(_))));

        let mut no_root = image;
        no_root[INODE_BMAP_START] &= !1;
        assert!(matches!(FileSystem::open(no_root), Err(FsError::BadImage(_))));

        assert!(matches!(
            FileSystem::open(vec![0; 100]),
            Err(FsError::BadImage(_))
        ));
    }
}
