use std::cell::RefCell;
use std::rc::Rc;

use super::chunk::{Chunk, ChunkData};
use super::id::{ChunkId, ClassId};
use crate::error::Result;

/// A shared, mutable node.
///
/// Back-references in the body resolve to clones of the same handle, so mutations
/// through one field are visible through every other field that aliases the node.
pub type NodeHandle = Rc<RefCell<Node>>;

/// A typed object: a class id and its ordered chunk sequence.
///
/// The chunk sequence is a list, not a map: duplicate chunk ids and the interleaving of
/// known and opaque chunks are preserved verbatim on save.
#[derive(Debug)]
pub struct Node {
    class_id: ClassId,
    chunks: Vec<Chunk>,
    source_index: Option<u32>,
}

impl Node {
    /// Creates an empty node of the given class.
    pub fn new(class_id: ClassId) -> Self {
        Self {
            class_id,
            chunks: Vec::new(),
            source_index: None,
        }
    }

    /// Wraps the node into a shareable handle.
    pub fn into_handle(self) -> NodeHandle {
        Rc::new(RefCell::new(self))
    }

    /// The class id exactly as read from the stream.
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    /// The node index this node was read with, reused on save when still free.
    pub fn source_index(&self) -> Option<u32> {
        self.source_index
    }

    pub(crate) fn set_source_index(&mut self, index: u32) {
        self.source_index = Some(index);
    }

    /// The ordered chunk sequence.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Mutable access to the chunk sequence.
    pub fn chunks_mut(&mut self) -> &mut Vec<Chunk> {
        &mut self.chunks
    }

    /// Appends a chunk.
    pub fn push(&mut self, chunk: Chunk) {
        self.chunks.push(chunk);
    }

    /// Appends a decoded chunk built from `data`.
    pub fn push_data<T: ChunkData>(&mut self, id: ChunkId, skippable: bool, data: T) {
        self.chunks.push(Chunk::known(id, skippable, Box::new(data)));
    }

    /// Finds the first chunk with the given id.
    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.id() == id)
    }

    /// Mutable variant of [`chunk`](Self::chunk).
    pub fn chunk_mut(&mut self, id: ChunkId) -> Option<&mut Chunk> {
        self.chunks.iter_mut().find(|c| c.id() == id)
    }

    /// Returns the first decoded chunk of type `T`.
    pub fn get<T: ChunkData>(&self) -> Option<&T> {
        self.chunks.iter().find_map(Chunk::data::<T>)
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut<T: ChunkData>(&mut self) -> Option<&mut T> {
        self.chunks.iter_mut().find_map(Chunk::data_mut::<T>)
    }

    /// Decodes every deferred chunk, returning how many were decoded.
    pub fn discover(&mut self) -> Result<usize> {
        let mut decoded = 0;
        for chunk in self.chunks.iter_mut().filter(|c| c.is_deferred()) {
            chunk.discover()?;
            decoded += 1;
        }
        Ok(decoded)
    }

    /// Ids of every chunk held as raw bytes.
    pub fn opaque_chunk_ids(&self) -> impl Iterator<Item = ChunkId> + '_ {
        self.chunks.iter().filter(|c| c.is_opaque()).map(Chunk::id)
    }
}

/// Structural equality: same class, same chunk order and contents.
///
/// The remembered source index is bookkeeping for byte-exact saves and is not part of
/// a node's identity.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.class_id == other.class_id && self.chunks == other.chunks
    }
}
