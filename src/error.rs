use thiserror::Error;

use crate::bitmap::BitmapKind;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("no free {0} left")]
    ExhaustedSpace(BitmapKind),
    #[error("{kind} {index} was already free")]
    DoubleFree { kind: BitmapKind, index: usize },
    #[error("invalid inode {0}")]
    InvalidInode(usize),
    #[error("index {index} out of range (limit {limit})")]
    OutOfRange { index: usize, limit: usize },
    #[error("size {0} does not fit in the inode size field")]
    SizeOverflow(usize),
    #[error("offset {0} is beyond the largest addressable file")]
    FileTooLarge(usize),
    #[error("no block allocated at logical block {0}")]
    HoleNotAllocated(usize),
    #[error("name is {0} bytes, longer than a directory entry allows")]
    NameTooLong(usize),
    #[error("invalid name {0:?}")]
    InvalidName(String),
    #[error("{0:?} already exists")]
    AlreadyExists(String),
    #[error("directory {0} is full")]
    DirectoryFull(usize),
    #[error("{0:?} not found")]
    NotFound(String),
    #[error("inode {0} is not a directory")]
    NotADirectory(usize),
    #[error("inode {0} is a directory")]
    IsADirectory(usize),
    #[error("directory {0} is not empty")]
    DirectoryNotEmpty(usize),
    #[error("bad image: {0}")]
    BadImage(String),
    #[error("codec: {0}")]
    Codec(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;
