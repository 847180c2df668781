//! The in-memory node graph.
//!
//! A container decodes into a tree of [`Node`]s shared through [`NodeHandle`]s. Each
//! node owns an ordered list of [`Chunk`]s, whose payload is either decoded
//! [`ChunkData`], a deferred raw buffer, or opaque bytes kept for round-trip fidelity.

/// Defines [`Chunk`], [`Payload`] and the [`ChunkData`] trait.
pub mod chunk;
/// Defines the [`ClassId`] and [`ChunkId`] types.
pub mod id;
/// Defines [`Node`] and [`NodeHandle`].
pub mod node;

pub use chunk::{Chunk, ChunkData, DeferredChunk, Payload};
pub use id::{ChunkId, ClassId};
pub use node::{Node, NodeHandle};
