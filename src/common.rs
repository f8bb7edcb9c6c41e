//! Disk layout:
//! [ bitmaps + super block (1 block) | inode table (4 blocks) | data blocks (251) ]
//! 64 KiB in total

/// Must be in the super block of every image
pub const FSMAGIC: u32 = 0x4d53_4653;

/// block size
pub const BSIZE: usize = 256;

/// size of the whole image (bytes)
pub const DISK_SIZE: usize = 64 << 10;

/// root i-number
pub const ROOTINO: usize = 0;

/// number of inodes in the table
pub const NINODES: usize = 64;

/// bytes of one on-disk inode
pub const INODE_SIZE: usize = 16;

/// width of one bitmap, in bytes
pub const BMAP_BYTES: usize = 32;

/// bits per bitmap
pub const BPB: usize = BMAP_BYTES * 8;

pub const INODE_BMAP_START: usize = 0;
pub const BLOCK_BMAP_START: usize = INODE_BMAP_START + BMAP_BYTES;

/// byte offset of the super block inside the bitmap region
pub const SB_START: usize = BLOCK_BMAP_START + BMAP_BYTES;

/// byte offset of the inode region
pub const INODE_START: usize = BSIZE;

/// byte offset of the data region
pub const DATA_START: usize = INODE_START + NINODES * INODE_SIZE;

/// number of data blocks
pub const NBLOCKS: usize = (DISK_SIZE - DATA_START) / BSIZE;

/// bytes of one block pointer
pub const PTR_SIZE: usize = 4;

/// direct blocks in inode
pub const NDIRECT: usize = 2;

/// pointers held by the indirect block
pub const NINDIRECT: usize = BSIZE / PTR_SIZE;

/// max # of blocks a file can have
pub const MAXFILE: usize = NDIRECT + NINDIRECT;

/// bits 12..=0 of the packed type/size field
pub const SIZE_BITS: u32 = 13;

/// largest size the packed field can hold
pub const MAX_SIZE_FIELD: usize = (1 << SIZE_BITS) - 1;

/// largest file, clipped to what the size field can express
pub const MAX_FILE_SIZE: usize = if MAXFILE * BSIZE < MAX_SIZE_FIELD {
    MAXFILE * BSIZE
} else {
    MAX_SIZE_FIELD
};

/// Directory is a file containing a sequence of dirent structures.
pub const DIRSIZ: usize = 15;

/// bytes of one dirent
pub const DIRENT_SIZE: usize = DIRSIZ + 1;

/// dirents per block
pub const DPB: usize = BSIZE / DIRENT_SIZE;

const _: () = assert!(NINODES <= BPB && NBLOCKS <= BPB);
const _: () = assert!(NINODES <= u8::MAX as usize + 1);
const _: () = assert!(SB_START < BSIZE);
const _: () = assert!(BSIZE % DIRENT_SIZE == 0);
