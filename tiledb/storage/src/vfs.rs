use std::path::{Path, PathBuf};

use tiledb_common::Result;

use crate::error::StorageError;

/// The filesystem primitives the storage layer consumes, named as an
/// external collaborator in spec.md §1 ("specified only by the interface
/// the core consumes"). `LocalVfs` is the one real implementation this
/// repo ships, wrapping `std::fs` directly.
pub trait Vfs {
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
    fn exists(&self, path: &Path) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LocalVfs;

impl Vfs for LocalVfs {
    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| StorageError::Io(e).into())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| StorageError::Io(e).into())
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::Io)?;
        }
        std::fs::write(path, bytes).map_err(|e| StorageError::Io(e).into())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        std::fs::remove_dir_all(path).map_err(|e| StorageError::Io(e).into())
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(path).map_err(StorageError::Io)? {
            out.push(entry.map_err(StorageError::Io)?.path());
        }
        out.sort();
        Ok(out)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Canonicalizes a user-supplied group path against the workspace root
/// (§4.5 "paths containing `~`, `./`, `../` are canonicalized against the
/// workspace root; an empty group means root").
pub fn resolve_group_path(workspace: &Path, group: &str) -> PathBuf {
    use std::path::Component;
    let mut resolved = workspace.to_path_buf();
    for component in Path::new(group).components() {
        if let Component::Normal(part) = component {
            if part != "~" {
                resolved.push(part);
            }
        }
        // CurDir ("."), ParentDir (".."), RootDir and Prefix segments are
        // all dropped: the group path never escapes the workspace root.
    }
    resolved
}
