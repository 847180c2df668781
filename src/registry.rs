//! Process-wide class and chunk catalog.
//!
//! The schema catalog describes hundreds of node classes, each accepting the chunks of
//! its own class plus those of its ancestors. Instead of an inheritance chain, every
//! class is a registry entry with an optional parent, and chunk validity is a walk up
//! that parent chain. New schemas register data, never new code paths in the engine.
//!
//! The registry is built once with [`RegistryBuilder`], then frozen behind an `Arc`
//! and passed explicitly into every load and save.
//!
//! ```rust
//! use gbx::{ChunkFlags, ClassId, ClassRegistry};
//! # use gbx::ReadWrite;
//! # #[derive(Debug, Default, PartialEq, ReadWrite)]
//! # struct MapName { name: String }
//!
//! const MAP: ClassId = ClassId::new(0x0304_3000);
//!
//! let mut builder = ClassRegistry::builder();
//! builder.register_node(MAP, "CGameCtnChallenge", None);
//! builder.register_chunk::<MapName>(MAP.chunk(0x0D), "MapName", ChunkFlags::default());
//! let registry = builder.build();
//!
//! assert!(registry.accepts(MAP, MAP.chunk(0x0D)));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::codec::ReadWrite;
use crate::graph::{ChunkData, ChunkId, ClassId, Node};

/// Builds the initial state of a node of a registered class.
pub type NodeFactory = fn(ClassId) -> Node;

/// Builds an empty, default-valued chunk ready to be filled by its handler.
pub type ChunkFactory = fn() -> Box<dyn ChunkData>;

fn empty_node(class_id: ClassId) -> Node {
    Node::new(class_id)
}

fn default_chunk<T: ChunkData + Default>() -> Box<dyn ChunkData> {
    Box::new(T::default())
}

/// Per-chunk handler flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkFlags {
    /// The chunk is written with an explicit size.
    pub skippable: bool,
    /// The chunk only appears in the container header.
    pub header_only: bool,
    /// The handler starts with its own `i32` version tag. The inspector reads the tag
    /// of versioned chunks that were kept raw.
    pub versioned: bool,
    /// Skippable chunk decoded on first access instead of during load.
    ///
    /// Only honored for handlers whose fields stay clear of the lookback tables (see
    /// [`ReadWrite::uses_lookback`](crate::ReadWrite::uses_lookback)). Others are
    /// decoded during load like any skippable chunk.
    pub lazy: bool,
}

impl ChunkFlags {
    /// Flags of a plain body chunk.
    pub const fn body() -> Self {
        Self {
            skippable: false,
            header_only: false,
            versioned: false,
            lazy: false,
        }
    }

    /// Flags of a skippable body chunk.
    pub const fn skippable() -> Self {
        Self {
            skippable: true,
            ..Self::body()
        }
    }

    /// Flags of a header chunk.
    pub const fn header() -> Self {
        Self {
            header_only: true,
            ..Self::body()
        }
    }

    /// Marks the handler as versioned.
    pub const fn versioned(self) -> Self {
        Self {
            versioned: true,
            ..self
        }
    }

    /// Marks the chunk for deferred decoding.
    pub const fn lazy(self) -> Self {
        Self { lazy: true, ..self }
    }
}

/// A registered node class.
#[derive(Clone)]
pub struct ClassDescriptor {
    /// The canonical class id.
    pub id: ClassId,
    /// Engine class name, used in logs and reports.
    pub name: &'static str,
    /// The class whose chunks this class also accepts.
    pub parent: Option<ClassId>,
    factory: NodeFactory,
}

impl ClassDescriptor {
    /// Builds a fresh node of this class.
    pub fn instantiate(&self) -> Node {
        (self.factory)(self.id)
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .finish()
    }
}

/// A registered chunk handler.
#[derive(Clone)]
pub struct ChunkDescriptor {
    /// The canonical chunk id.
    pub id: ChunkId,
    /// Chunk name, used in logs and reports.
    pub name: &'static str,
    /// Handler flags.
    pub flags: ChunkFlags,
    lookback: bool,
    factory: ChunkFactory,
}

impl ChunkDescriptor {
    /// Builds an empty chunk for the handler to fill.
    pub fn instantiate(&self) -> Box<dyn ChunkData> {
        (self.factory)()
    }

    /// Whether the handler can read or extend the Id and node lookback tables.
    pub fn uses_lookback(&self) -> bool {
        self.lookback
    }

    /// Whether loads postpone decoding this chunk until it is discovered.
    pub fn defers(&self) -> bool {
        self.flags.skippable && self.flags.lazy && !self.lookback
    }
}

impl fmt::Debug for ChunkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("lookback", &self.lookback)
            .finish()
    }
}

/// Mutable registry under construction.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    classes: HashMap<ClassId, ClassDescriptor>,
    chunks: HashMap<ChunkId, ChunkDescriptor>,
    aliases: HashMap<ClassId, ClassId>,
}

impl RegistryBuilder {
    /// Registers a class whose nodes start empty.
    pub fn register_node(
        &mut self,
        id: ClassId,
        name: &'static str,
        parent: Option<ClassId>,
    ) -> &mut Self {
        self.register_node_with(id, name, parent, empty_node)
    }

    /// Registers a class with a custom node factory.
    pub fn register_node_with(
        &mut self,
        id: ClassId,
        name: &'static str,
        parent: Option<ClassId>,
        factory: NodeFactory,
    ) -> &mut Self {
        self.classes.insert(
            id,
            ClassDescriptor {
                id,
                name,
                parent,
                factory,
            },
        );
        self
    }

    /// Registers the handler for one chunk id. `T` is the chunk's field layout.
    pub fn register_chunk<T: ChunkData + Default>(
        &mut self,
        id: ChunkId,
        name: &'static str,
        flags: ChunkFlags,
    ) -> &mut Self {
        self.chunks.insert(
            id,
            ChunkDescriptor {
                id,
                name,
                flags,
                lookback: <T as ReadWrite>::uses_lookback(),
                factory: default_chunk::<T>,
            },
        );
        self
    }

    /// Maps a legacy class id onto its current id.
    ///
    /// Nodes and chunks stored under `old` dispatch to the handlers registered under
    /// `current`, while the original ids are kept on the nodes and chunks themselves so
    /// that saves reproduce them.
    pub fn register_alias(&mut self, old: ClassId, current: ClassId) -> &mut Self {
        self.aliases.insert(old, current);
        self
    }

    /// Freezes the registry.
    pub fn build(self) -> Arc<ClassRegistry> {
        Arc::new(ClassRegistry {
            classes: self.classes,
            chunks: self.chunks,
            aliases: self.aliases,
        })
    }
}

/// The frozen class and chunk catalog.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: HashMap<ClassId, ClassDescriptor>,
    chunks: HashMap<ChunkId, ChunkDescriptor>,
    aliases: HashMap<ClassId, ClassId>,
}

impl ClassRegistry {
    /// Starts a new registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Follows alias mappings to the current class id.
    pub fn canonical(&self, id: ClassId) -> ClassId {
        let mut current = id;
        // Aliases form short chains; the bound guards against accidental cycles.
        for _ in 0..8 {
            match self.aliases.get(&current) {
                Some(next) if *next != current => current = *next,
                _ => break,
            }
        }
        current
    }

    /// Looks up a class.
    pub fn resolve(&self, id: ClassId) -> Option<&ClassDescriptor> {
        self.classes.get(&self.canonical(id))
    }

    /// Looks up a chunk handler.
    pub fn resolve_chunk(&self, id: ChunkId) -> Option<&ChunkDescriptor> {
        let canonical = id.with_class(self.canonical(id.class_id()));
        self.chunks.get(&canonical)
    }

    /// Builds a node for `id`: the registered factory's output, or an empty
    /// placeholder for unknown classes.
    pub fn instantiate(&self, id: ClassId) -> Node {
        // Factories receive the id as found in the stream, aliases included.
        match self.resolve(id) {
            Some(desc) => (desc.factory)(id),
            None => Node::new(id),
        }
    }

    /// Iterates `id` and its registered ancestors, nearest first.
    pub fn ancestors(&self, id: ClassId) -> Ancestors<'_> {
        Ancestors {
            registry: self,
            next: self.resolve(id).map(|d| d.id),
            steps: 0,
        }
    }

    /// Whether a node of class `class_id` may carry chunk `chunk_id`.
    pub fn accepts(&self, class_id: ClassId, chunk_id: ChunkId) -> bool {
        let owner = self.canonical(chunk_id.class_id());
        self.ancestors(class_id).any(|c| c == owner)
    }

    /// The handler for `chunk_id` when read inside a node of class `class_id`.
    ///
    /// Returns `None` when the chunk is unregistered, belongs to an unrelated class, or
    /// its header/body category does not match `in_header`.
    pub fn handler_for(
        &self,
        class_id: ClassId,
        chunk_id: ChunkId,
        in_header: bool,
    ) -> Option<&ChunkDescriptor> {
        if !self.accepts(class_id, chunk_id) {
            return None;
        }
        self.resolve_chunk(chunk_id)
            .filter(|d| d.flags.header_only == in_header)
    }

    /// Number of registered classes.
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Number of registered chunk handlers.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

/// Iterator over a class and its registered ancestors.
#[derive(Debug)]
pub struct Ancestors<'a> {
    registry: &'a ClassRegistry,
    next: Option<ClassId>,
    steps: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = ClassId;

    fn next(&mut self) -> Option<ClassId> {
        let current = self.next?;
        self.steps += 1;
        self.next = if self.steps > 64 {
            None
        } else {
            self.registry
                .resolve(current)
                .and_then(|d| d.parent)
                .map(|p| self.registry.canonical(p))
        };
        Some(current)
    }
}
