use std::path::PathBuf;
use std::rc::Rc;

use tiledb_common::Result;
use tiledb_schema::ArraySchema;

use crate::error::StorageError;
use crate::fragment::{self, FragmentTree};
use crate::vfs::Vfs;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpenMode {
    Read,
    Write,
}

/// In-RAM state for one open array: its schema, on-disk location, mode,
/// accumulated fragment bookkeeping, and (write mode only) the pending
/// write buffer (§4.5 "array descriptor table").
pub struct ArrayState {
    pub schema: Rc<ArraySchema>,
    pub array_dir: PathBuf,
    pub mode: OpenMode,
    pub fragment_tree: FragmentTree,
    pub next_fragment_seq: u64,
    pub write_buffer: Vec<Vec<u8>>,
    pub write_buffer_bytes: usize,
    pub write_buffer_needs_sort: bool,
}

/// Process-wide table of open arrays, bounded at `config.max_open_arrays()`
/// (§4.5, §8 property 7). Allocates the lowest free slot on open.
#[derive(Default)]
pub struct DescriptorTable {
    slots: Vec<Option<ArrayState>>,
}

impl DescriptorTable {
    pub fn open(
        &mut self,
        vfs: &dyn Vfs,
        max_open_arrays: usize,
        workspace: &std::path::Path,
        group: &str,
        array_name: &str,
        mode: OpenMode,
    ) -> Result<usize> {
        let open_count = self.slots.iter().filter(|s| s.is_some()).count();
        if open_count >= max_open_arrays {
            return Err(StorageError::TooManyOpen(max_open_arrays).into());
        }

        let group_dir = crate::vfs::resolve_group_path(workspace, group);
        let array_dir = fragment::array_dir(&group_dir, array_name);
        let schema = Rc::new(fragment::load_schema(vfs, &array_dir)?);

        let tree_path = array_dir.join(fragment::FRAGMENT_TREE_FILE);
        let fragment_tree = if vfs.exists(&tree_path) {
            FragmentTree::from_bytes(&vfs.read(&tree_path)?)?
        } else {
            FragmentTree::default()
        };

        let next_fragment_seq = fragment::list_fragments(vfs, &array_dir)?.len() as u64;

        let state = ArrayState {
            schema,
            array_dir,
            mode,
            fragment_tree,
            next_fragment_seq,
            write_buffer: Vec::new(),
            write_buffer_bytes: 0,
            write_buffer_needs_sort: false,
        };

        let slot = self.slots.iter().position(|s| s.is_none());
        match slot {
            Some(i) => {
                self.slots[i] = Some(state);
                Ok(i)
            }
            None => {
                self.slots.push(Some(state));
                Ok(self.slots.len() - 1)
            }
        }
    }

    pub fn get(&self, ad: usize) -> Result<&ArrayState> {
        self.slots
            .get(ad)
            .and_then(|s| s.as_ref())
            .ok_or(StorageError::NotOpen(ad))
            .map_err(Into::into)
    }

    pub fn get_mut(&mut self, ad: usize) -> Result<&mut ArrayState> {
        self.slots
            .get_mut(ad)
            .and_then(|s| s.as_mut())
            .ok_or(StorageError::NotOpen(ad))
            .map_err(Into::into)
    }

    /// Idempotent: closing an already-closed or never-open descriptor
    /// succeeds silently (§4.5 "close is idempotent for already-closed
    /// descriptors").
    pub fn take(&mut self, ad: usize) -> Option<ArrayState> {
        self.slots.get_mut(ad).and_then(|s| s.take())
    }
}
