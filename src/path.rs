use super::*;
use dir::Directory;
use disk::BlockStore;
use inode::InodeTable;

/// Non-empty components of a slash-separated path.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|part| !part.is_empty())
}

/// Walk `path` from the root and return the inode number it names.
pub fn resolve(store: &BlockStore, path: &str) -> Result<usize> {
    components(path).try_fold(ROOTINO, |ino, name| step(store, ino, name))
}

/// Resolve everything but the last component: (parent directory, last name).
/// Fails with `InvalidName` for the root itself, which has no name.
pub fn resolve_parent<'a>(store: &BlockStore, path: &'a str) -> Result<(usize, &'a str)> {
    let parts: Vec<&str> = components(path).collect();
    let (last, dirs) = parts
        .split_last()
        .ok_or_else(|| FsError::InvalidName(path.to_string()))?;
    let parent = dirs
        .iter()
        .try_fold(ROOTINO, |ino, name| step(store, ino, name))?;
    if !InodeTable::read(store, parent)?.is_dir() {
        return Err(FsError::NotADirectory(parent));
    }
    Ok((parent, *last))
}

fn step(store: &BlockStore, ino: usize, name: &str) -> Result<usize> {
    if !InodeTable::read(store, ino)?.is_dir() {
        return Err(FsError::NotADirectory(ino));
    }
    Directory::lookup(store, ino, name)
}
