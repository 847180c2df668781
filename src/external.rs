//! The external file table.
//!
//! Lists the nodes of a container that live in other files. Each entry binds a node
//! index of the body to either a file, located through a folder tree relative to the
//! container, or a numeric resource id. Reference fields that meet one of those node
//! indices decode to [`NodeRef::External`](crate::NodeRef::External) without touching
//! the target; [`Gbx::resolve`](crate::Gbx::resolve) loads it on demand.
//!
//! ```text
//! [num external u32]
//! if num > 0:
//!   [ancestor level u32]
//!   folders: [num sub u32] ([name string] folders)*
//!   entries: [flags u32]
//!            flags & 4 == 0: [file name string]   else: [resource index u32]
//!            [node index u32]
//!            [v>=5] [use file u32]
//!            flags & 4 == 0: [folder index u32]   (1-based, 0 = the container folder)
//! ```

use std::cell::OnceCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{GbxError, Result};
use crate::graph::NodeHandle;
use crate::io::{ByteReader, ByteWriter};

const RESOURCE_FLAG: u32 = 4;
const MAX_FOLDER_DEPTH: usize = 64;

/// Loads the raw bytes of an external file.
///
/// Paths are relative to the folder of the container that lists them, already
/// prefixed with one `..` per ancestor level.
pub trait FileLoader {
    /// Returns the file's bytes. A missing file is reported as [`io::ErrorKind::NotFound`].
    fn load(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Loads external files from the local file system, relative to a base folder.
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    /// Resolves paths against `root`, normally the folder of the primary container.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileLoader for FsLoader {
    fn load(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.root.join(path))
    }
}

/// A folder of the reference table's folder tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Folder {
    /// Folder name, without separators.
    pub name: String,
    /// Sub-folders, in stream order.
    pub children: Vec<Folder>,
}

/// Where an external entry points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalTarget {
    /// A file, located in the folder with the given 1-based pre-order index.
    File {
        /// File name.
        name: String,
        /// 1-based folder index, `0` for the container's own folder.
        folder_index: u32,
    },
    /// A built-in resource identified by number.
    Resource(u32),
}

/// One external node binding.
#[derive(Debug, Clone)]
pub struct ExternalEntry {
    /// Raw flags word. Bit 2 selects a resource target.
    pub flags: u32,
    /// The file or resource this entry points to.
    pub target: ExternalTarget,
    /// The body node index this entry is bound to.
    pub node_index: u32,
    /// The use-file word of version 5 and later containers.
    pub use_file: Option<u32>,
    resolved: OnceCell<NodeHandle>,
}

impl ExternalEntry {
    /// A file entry bound to `node_index`.
    pub fn file(name: impl Into<String>, folder_index: u32, node_index: u32) -> Self {
        Self {
            flags: 0,
            target: ExternalTarget::File {
                name: name.into(),
                folder_index,
            },
            node_index,
            use_file: Some(0),
            resolved: OnceCell::new(),
        }
    }

    /// The root node of the target, if it was resolved already.
    pub fn resolved(&self) -> Option<&NodeHandle> {
        self.resolved.get()
    }

    pub(crate) fn cache(&self, node: NodeHandle) -> NodeHandle {
        self.resolved.get_or_init(|| node).clone()
    }
}

impl PartialEq for ExternalEntry {
    fn eq(&self, other: &Self) -> bool {
        self.flags == other.flags
            && self.target == other.target
            && self.node_index == other.node_index
            && self.use_file == other.use_file
    }
}

/// The reference table of one container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalFileTable {
    /// How many folders above the container's folder the tree is rooted.
    pub ancestor_level: u32,
    /// Top-level folders.
    pub folders: Vec<Folder>,
    /// Entries, in stream order.
    pub entries: Vec<ExternalEntry>,
}

impl ExternalFileTable {
    /// Returns true if the table lists no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry bound to `node_index`.
    pub fn entry(&self, node_index: u32) -> Option<&ExternalEntry> {
        self.entries.iter().find(|e| e.node_index == node_index)
    }

    /// Folder paths in pre-order, so that `paths[i - 1]` belongs to folder index `i`.
    pub fn folder_paths(&self) -> Vec<PathBuf> {
        fn walk(folders: &[Folder], parent: &Path, out: &mut Vec<PathBuf>) {
            for folder in folders {
                let path = parent.join(&folder.name);
                out.push(path.clone());
                walk(&folder.children, &path, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.folders, Path::new(""), &mut out);
        out
    }

    /// The path of an entry's file relative to the container's folder.
    pub fn relative_path(&self, entry: &ExternalEntry) -> Result<PathBuf> {
        let ExternalTarget::File { name, folder_index } = &entry.target else {
            return Err(GbxError::Reference(format!(
                "node {} points to a built-in resource, not a file",
                entry.node_index
            )));
        };

        let mut path = PathBuf::new();
        for _ in 0..self.ancestor_level {
            path.push("..");
        }
        if *folder_index > 0 {
            let folders = self.folder_paths();
            let folder = folders
                .get(*folder_index as usize - 1)
                .ok_or_else(|| {
                    GbxError::Reference(format!(
                        "folder index {folder_index} outside the {} listed folders",
                        folders.len()
                    ))
                })?;
            path.push(folder);
        }
        path.push(name);
        Ok(path)
    }

    /// Parses the table.
    pub fn read(r: &mut ByteReader<'_>, version: u16) -> Result<Self> {
        let count = r.read_u32()? as usize;
        if count == 0 {
            return Ok(Self::default());
        }
        // Smallest entry: flags, resource index and node index.
        if count.saturating_mul(12) > r.remaining() {
            return Err(GbxError::Format(format!(
                "reference table declares {count} entries but only {} bytes remain",
                r.remaining()
            )));
        }

        let ancestor_level = r.read_u32()?;
        let folders = read_folders(r, 0)?;

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let flags = r.read_u32()?;
            let is_resource = flags & RESOURCE_FLAG != 0;
            let (name, resource) = if is_resource {
                (None, r.read_u32()?)
            } else {
                (Some(r.read_string()?), 0)
            };
            let node_index = r.read_u32()?;
            let use_file = if version >= 5 { Some(r.read_u32()?) } else { None };
            let target = match name {
                Some(name) => ExternalTarget::File {
                    name,
                    folder_index: r.read_u32()?,
                },
                None => ExternalTarget::Resource(resource),
            };
            entries.push(ExternalEntry {
                flags,
                target,
                node_index,
                use_file,
                resolved: OnceCell::new(),
            });
        }

        Ok(Self {
            ancestor_level,
            folders,
            entries,
        })
    }

    /// Serializes the table.
    pub fn write(&self, w: &mut ByteWriter, version: u16) -> Result<()> {
        let count = u32::try_from(self.entries.len())
            .map_err(|_| GbxError::format("too many external entries"))?;
        w.write_u32(count);
        if count == 0 {
            return Ok(());
        }
        w.write_u32(self.ancestor_level);
        write_folders(w, &self.folders)?;

        for entry in &self.entries {
            let is_resource = matches!(entry.target, ExternalTarget::Resource(_));
            if is_resource != (entry.flags & RESOURCE_FLAG != 0) {
                return Err(GbxError::Format(format!(
                    "external entry {} flags 0x{:X} disagree with its target",
                    entry.node_index, entry.flags
                )));
            }
            w.write_u32(entry.flags);
            match &entry.target {
                ExternalTarget::File { name, .. } => w.write_string(name)?,
                ExternalTarget::Resource(index) => w.write_u32(*index),
            }
            w.write_u32(entry.node_index);
            if version >= 5 {
                w.write_u32(entry.use_file.unwrap_or(0));
            }
            if let ExternalTarget::File { folder_index, .. } = &entry.target {
                w.write_u32(*folder_index);
            }
        }
        Ok(())
    }
}

fn read_folders(r: &mut ByteReader<'_>, depth: usize) -> Result<Vec<Folder>> {
    if depth > MAX_FOLDER_DEPTH {
        return Err(GbxError::format("folder tree nests too deeply"));
    }
    let count = r.read_u32()? as usize;
    if count.saturating_mul(8) > r.remaining() {
        return Err(GbxError::Format(format!(
            "folder declares {count} sub-folders but only {} bytes remain",
            r.remaining()
        )));
    }
    let mut folders = Vec::with_capacity(count);
    for _ in 0..count {
        let name = r.read_string()?;
        let children = read_folders(r, depth + 1)?;
        folders.push(Folder { name, children });
    }
    Ok(folders)
}

fn write_folders(w: &mut ByteWriter, folders: &[Folder]) -> Result<()> {
    let count =
        u32::try_from(folders.len()).map_err(|_| GbxError::format("too many folders"))?;
    w.write_u32(count);
    for folder in folders {
        w.write_string(&folder.name)?;
        write_folders(w, &folder.children)?;
    }
    Ok(())
}
