use std::any::Any;
use std::fmt;

use crate::codec::ReadWrite;
use crate::engine::{DeferredScope, ScopeReplay};
use crate::error::Result;
use crate::graph::ChunkId;

/// Decoded field data of one chunk, supplied by the schema catalog.
///
/// Implemented automatically for every `ReadWrite + Debug + PartialEq + 'static` type,
/// which is what `#[derive(ReadWrite)]` structs are.
pub trait ChunkData: ReadWrite + fmt::Debug + 'static {
    /// Upcast for downcasting to the concrete chunk type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete chunk type.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Structural equality across trait objects.
    fn eq_dyn(&self, other: &dyn ChunkData) -> bool;
}

impl<T> ChunkData for T
where
    T: ReadWrite + fmt::Debug + PartialEq + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn ChunkData) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }
}

/// The storage state of a chunk.
#[derive(Debug)]
pub enum Payload {
    /// Decoded by its registered handler.
    Known(Box<dyn ChunkData>),
    /// A skippable chunk whose decoding is postponed until first access.
    Deferred(DeferredChunk),
    /// Raw bytes: unregistered chunks, and chunks whose version was rejected in lenient
    /// mode.
    Opaque(Vec<u8>),
}

/// Raw bytes of a lazily decoded chunk, together with where it was read.
pub struct DeferredChunk {
    pub(crate) bytes: Vec<u8>,
    pub(crate) scope: DeferredScope,
}

impl DeferredChunk {
    /// The undecoded payload.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for DeferredChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeferredChunk({} bytes)", self.bytes.len())
    }
}

/// One record in a node's ordered chunk sequence.
#[derive(Debug)]
pub struct Chunk {
    id: ChunkId,
    skippable: bool,
    payload: Payload,
    replay: Option<Box<ScopeReplay>>,
}

impl Chunk {
    /// A decoded chunk.
    pub fn known(id: ChunkId, skippable: bool, data: Box<dyn ChunkData>) -> Self {
        Self {
            id,
            skippable,
            payload: Payload::Known(data),
            replay: None,
        }
    }

    /// A raw chunk preserved byte for byte.
    pub fn opaque(id: ChunkId, skippable: bool, bytes: Vec<u8>) -> Self {
        Self {
            id,
            skippable,
            payload: Payload::Opaque(bytes),
            replay: None,
        }
    }

    pub(crate) fn with_replay(mut self, replay: ScopeReplay) -> Self {
        if !replay.is_empty() {
            self.replay = Some(Box::new(replay));
        }
        self
    }

    pub(crate) fn replay(&self) -> Option<&ScopeReplay> {
        self.replay.as_deref()
    }

    pub(crate) fn deferred(id: ChunkId, bytes: Vec<u8>, scope: DeferredScope) -> Self {
        Self {
            id,
            skippable: true,
            payload: Payload::Deferred(DeferredChunk { bytes, scope }),
            replay: None,
        }
    }

    /// The chunk id exactly as it appeared in the stream.
    pub fn id(&self) -> ChunkId {
        self.id
    }

    /// Whether the chunk is framed with an explicit size.
    pub fn is_skippable(&self) -> bool {
        self.skippable
    }

    /// The storage state.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub(crate) fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    /// Returns true if the chunk is held as raw bytes.
    pub fn is_opaque(&self) -> bool {
        matches!(self.payload, Payload::Opaque(_))
    }

    /// Returns true if the chunk still waits for discovery.
    pub fn is_deferred(&self) -> bool {
        matches!(self.payload, Payload::Deferred(_))
    }

    /// Returns the decoded data as `T`, if decoded and of that type.
    pub fn data<T: ChunkData>(&self) -> Option<&T> {
        match &self.payload {
            Payload::Known(data) => data.as_any().downcast_ref(),
            _ => None,
        }
    }

    /// Mutable variant of [`data`](Self::data).
    pub fn data_mut<T: ChunkData>(&mut self) -> Option<&mut T> {
        match &mut self.payload {
            Payload::Known(data) => data.as_any_mut().downcast_mut(),
            _ => None,
        }
    }

    /// Decodes a deferred chunk in place. Does nothing for other states.
    ///
    /// On failure the chunk stays deferred, so a later save still emits the original
    /// bytes.
    pub fn discover(&mut self) -> Result<()> {
        if let Payload::Deferred(deferred) = &self.payload {
            let data = crate::engine::discover(self.id, deferred)?;
            self.payload = Payload::Known(data);
        }
        Ok(())
    }
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        if self.id != other.id || self.skippable != other.skippable {
            return false;
        }
        match (&self.payload, &other.payload) {
            (Payload::Known(a), Payload::Known(b)) => a.eq_dyn(b.as_ref()),
            (Payload::Opaque(a), Payload::Opaque(b)) => a == b,
            (Payload::Deferred(a), Payload::Deferred(b)) => a.bytes == b.bytes,
            _ => false,
        }
    }
}
