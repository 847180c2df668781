//! The public entry points: [`GbxOptions`] to load, [`Gbx`] to inspect, mutate, resolve
//! and save.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use memmap2::Mmap;
use tracing::debug;

use crate::compression::{Compressor, PackedBody, default_compressor};
use crate::engine::{EngineSettings, HeaderChunk, LoadReport};
use crate::error::{GbxError, Result};
use crate::external::{ExternalFileTable, FileLoader};
use crate::format::Preamble;
use crate::graph::{ClassId, Node, NodeHandle};
use crate::reader::{GbxReader, HeaderView};
use crate::reference::NodeRef;
use crate::registry::ClassRegistry;
use crate::writer;

/// Load and save configuration.
///
/// ```rust
/// use gbx::{ClassRegistry, GbxOptions, NoCompression};
/// use std::sync::Arc;
///
/// let options = GbxOptions::new(ClassRegistry::builder().build())
///     .lenient(false)
///     .max_depth(64)
///     .compressor(Arc::new(NoCompression));
/// assert!(!options.is_lenient());
/// ```
#[derive(Debug, Clone)]
pub struct GbxOptions {
    registry: Arc<ClassRegistry>,
    settings: EngineSettings,
    compressor: Arc<dyn Compressor>,
}

impl GbxOptions {
    /// Default options over `registry`: lenient, lazy discovery, the default compressor.
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self {
            registry,
            settings: EngineSettings::default(),
            compressor: default_compressor(),
        }
    }

    /// In lenient mode, skippable chunks whose handler meets a version it does not
    /// decode are kept opaque instead of aborting the load.
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.settings.lenient = lenient;
        self
    }

    /// Whether chunks registered as lazy are deferred until discovered.
    pub fn discover_lazily(mut self, lazily: bool) -> Self {
        self.settings.discover_lazily = lazily;
        self
    }

    /// Bounds node nesting depth.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.settings.max_depth = depth;
        self
    }

    /// Sets the body compressor.
    pub fn compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Returns true in lenient mode.
    pub fn is_lenient(&self) -> bool {
        self.settings.lenient
    }

    /// The class catalog.
    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    pub(crate) fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub(crate) fn body_compressor(&self) -> &Arc<dyn Compressor> {
        &self.compressor
    }

    /// Parses everything up to the body.
    pub fn load_header(&self, data: &[u8]) -> Result<HeaderView> {
        GbxReader::new(data, self.clone()).read_header()
    }

    /// Parses a whole container.
    pub fn load(&self, data: &[u8]) -> Result<Gbx> {
        let mut reader = GbxReader::new(data, self.clone());
        let header = reader.read_header()?;
        reader.read_body(header)
    }

    /// Memory-maps and parses a whole container file.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<Gbx> {
        let mmap = map_file(path.as_ref())?;
        self.load(&mmap)
    }

    /// Memory-maps a container file and parses everything up to the body.
    pub fn open_header<P: AsRef<Path>>(&self, path: P) -> Result<HeaderView> {
        let mmap = map_file(path.as_ref())?;
        self.load_header(&mmap)
    }
}

fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    // Safety: the map is read-only and dropped before returning to the caller. A file
    // truncated by another process during the load is outside our control.
    #[allow(unsafe_code)]
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

/// A loaded or newly built container.
#[derive(Debug)]
pub struct Gbx {
    pub(crate) header: HeaderView,
    pub(crate) root: NodeHandle,
    pub(crate) body_trailing: Vec<u8>,
    pub(crate) file_trailing: Vec<u8>,
    pub(crate) packed: Option<PackedBody>,
    pub(crate) options: GbxOptions,
}

impl Gbx {
    /// A new container around `root`, using the current preamble defaults.
    pub fn new(root: Node, options: GbxOptions) -> Self {
        let preamble = Preamble::new(root.class_id());
        Self::from_parts(
            HeaderView::new(preamble),
            root.into_handle(),
            Vec::new(),
            Vec::new(),
            options,
        )
    }

    pub(crate) fn from_parts(
        header: HeaderView,
        root: NodeHandle,
        body_trailing: Vec<u8>,
        file_trailing: Vec<u8>,
        options: GbxOptions,
    ) -> Self {
        Self {
            header,
            root,
            body_trailing,
            file_trailing,
            packed: None,
            options,
        }
    }

    /// Class id of the root node.
    pub fn class_id(&self) -> ClassId {
        self.header.class_id()
    }

    /// The header, reference table and load report.
    pub fn header(&self) -> &HeaderView {
        &self.header
    }

    /// Mutable access to the preamble.
    pub fn preamble_mut(&mut self) -> &mut Preamble {
        &mut self.header.preamble
    }

    /// Mutable access to the header chunks.
    pub fn header_chunks_mut(&mut self) -> &mut Vec<HeaderChunk> {
        &mut self.header.chunks
    }

    /// Mutable access to the external file table.
    pub fn references_mut(&mut self) -> &mut ExternalFileTable {
        &mut self.header.references
    }

    /// The root node.
    pub fn root(&self) -> &NodeHandle {
        &self.root
    }

    /// Chunks the load kept opaque, and unregistered classes met on the way.
    pub fn report(&self) -> &LoadReport {
        &self.header.report
    }

    /// Bytes found after the last chunk of the body, written back unchanged.
    pub fn trailing_bytes(&self) -> usize {
        self.body_trailing.len() + self.file_trailing.len()
    }

    /// Returns the node behind a reference slot, loading external files on demand.
    ///
    /// In-container nodes are returned as is. External slots are resolved through
    /// `loader` on first access and cached for the lifetime of this container; later
    /// calls perform no I/O. Failures only concern this call and leave the graph
    /// untouched.
    pub fn resolve(&self, slot: &NodeRef, loader: &dyn FileLoader) -> Result<NodeHandle> {
        let ext = match slot {
            NodeRef::Null => return Err(GbxError::reference("cannot resolve a null reference")),
            NodeRef::Node(handle) => return Ok(Rc::clone(handle)),
            NodeRef::External(ext) => *ext,
        };

        let references = &self.header.references;
        let entry = references.entry(ext.node_index()).ok_or_else(|| {
            GbxError::Reference(format!(
                "node {} is not listed in the external file table",
                ext.node_index()
            ))
        })?;
        if let Some(node) = entry.resolved() {
            return Ok(node.clone());
        }

        let path = references.relative_path(entry)?;
        debug!(node = ext.node_index(), path = %path.display(), "resolving external node");
        let bytes = loader.load(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                GbxError::Reference(format!("external file {} not found", path.display()))
            }
            _ => GbxError::from(e),
        })?;
        let external = self.options.load(&bytes)?;
        Ok(entry.cache(external.root))
    }

    /// Serializes the container into `out`.
    pub fn save<W: Write>(&mut self, mut out: W) -> Result<()> {
        let bytes = self.to_bytes()?;
        out.write_all(&bytes)?;
        out.flush()?;
        Ok(())
    }

    /// Serializes the container into a new buffer.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        writer::write_container(self)
    }
}
