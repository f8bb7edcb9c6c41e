//! A single-volume inode filesystem over a fixed 64 KiB image.
//!
//! From the bottom up:
//! - `disk`: the image arena and its data blocks
//! - `bitmap`: inode and block allocation
//! - `inode`: the inode table and the packed type/size field
//! - `bmap`: file offset -> data block, through direct and indirect pointers
//! - `dir`: name -> inode number entries
//! - `path`: slash-separated path walking
//! - `fs`: format/open and file operations on top of all of the above

mod blk_dev; // where images live between mounts
mod common; // layout constants
mod error;

pub mod bitmap;
pub mod bmap;
pub mod dir;
pub mod disk;
pub mod fs;
pub mod inode;
pub mod path;

pub use blk_dev::{BlockDevice, MemDevice, DEV_BLOCKS};
pub use common::*;
pub use error::{FsError, Result};
pub use fs::{FileSystem, Stat, SuperBlock};
pub use inode::FileKind;
