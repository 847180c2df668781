//! # gbx
//!
//! A reader and writer for GameBox (GBX) containers, the binary format a racing-game
//! franchise uses to persist maps, replays, items and UI layouts as graphs of
//! versioned, chunk-structured records.
//!
//! ## Overview
//!
//! The crate is the generic engine, not the schema catalog. It turns a byte stream into
//! a mutable node graph and back, and round-trips every byte it does not understand.
//! Concrete class layouts are supplied by the caller through a [`ClassRegistry`].
//!
//! ### Key Features
//!
//! *   **Byte-exact round-trips:** unregistered chunks, unknown classes and skippable
//!     chunks of an unsupported version are preserved opaque, in their original order.
//!     The compressed body block and the exact Id words are kept as well.
//! *   **One routine, two directions:** a chunk handler is a single
//!     [`ReadWrite::read_write`] call that serves both load and save, usually generated
//!     by `#[derive(ReadWrite)]`.
//! *   **Versioned chunks:** handlers own their version tag, and a version read from a
//!     file is written back unchanged.
//! *   **Shared sub-graphs:** back-references resolve to the same [`NodeHandle`], so
//!     aliasing survives both load and save.
//! *   **Lazy externals:** nodes stored in other files are only loaded by an explicit
//!     [`Gbx::resolve`].
//! *   **Header-only loads:** [`GbxOptions::load_header`] stops before the body for fast
//!     bulk indexing.
//!
//! ## Architecture
//!
//! ### File Format
//!
//! ```text
//! [Preamble] [Header chunks] [num nodes] [External file table] [Body]
//! ```
//!
//! The header is never compressed. The body is LZO1X-compressed by default and is
//! decompressed into memory as a whole before chunk parsing begins. See [`format`] for
//! the byte layout.
//!
//! ### The Graph Model
//!
//! A [`Node`] is a class id and an ordered list of [`Chunk`]s. Reference fields decode
//! to [`NodeRef`]: null, an in-container node, or an external binding. Nodes are shared
//! through `Rc<RefCell<_>>`, so a loaded graph is single-threaded; the registry is
//! immutable and shared through `Arc`.
//!
//! ### Scopes
//!
//! Interned identifiers ([`Id`]) are looked back within one scope: each header chunk,
//! the body, and every encapsulated block start a fresh [`IdTable`]. The node table is
//! one per body.
//!
//! ## Usage Patterns
//!
//! ```rust
//! use gbx::{ChunkFlags, ClassId, ClassRegistry, Gbx, GbxOptions, Node, ReadWrite};
//!
//! const ITEM: ClassId = ClassId::new(0x2E00_2000);
//!
//! #[derive(Debug, Default, PartialEq, ReadWrite)]
//! #[gbx(version(min = 0, max = 1))]
//! struct ItemInfo {
//!     #[gbx(version)]
//!     version: i32,
//!     name: String,
//!     #[gbx(since = 1)]
//!     price: Option<u32>,
//! }
//!
//! let mut builder = ClassRegistry::builder();
//! builder.register_node(ITEM, "CGameItemModel", None);
//! builder.register_chunk::<ItemInfo>(ITEM.chunk(0x01), "Info", ChunkFlags::body().versioned());
//! let options = GbxOptions::new(builder.build());
//!
//! let mut item = Node::new(ITEM);
//! item.push_data(ITEM.chunk(0x01), false, ItemInfo { version: 1, name: "Cone".into(), price: Some(5) });
//!
//! let bytes = Gbx::new(item, options.clone()).to_bytes()?;
//! let loaded = options.load(&bytes)?;
//! let root = loaded.root().borrow();
//! assert_eq!(root.get::<ItemInfo>().and_then(|i| i.price), Some(5));
//! # Ok::<(), gbx::GbxError>(())
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **Encapsulated Unsafe:** the only `unsafe` call memory-maps input files in
//!   [`GbxOptions::open`].
//! * **No Panics:** no `unwrap()` or `panic!()` calls in the library (enforced by clippy
//!   lints). Malformed input is always reported through [`GbxError`].
//! * **Logging:** the engine emits `tracing` events; install any subscriber to see
//!   framing, per-chunk and degradation events.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

pub mod api;
pub mod codec;
pub mod compression;
pub mod engine;
pub mod error;
pub mod external;
pub mod format;
pub mod ident;
pub mod inspector;
pub mod reader;
pub mod reference;
pub mod registry;

/// The in-memory node graph.
pub mod graph;

/// Little-endian byte cursors.
pub mod io;

mod writer;

#[doc(hidden)]
pub mod rt;

// --- RE-EXPORTS ---

#[cfg(feature = "lz4_flex")]
pub use compression::Lz4Compressor;
pub use compression::{Compressor, Lzo1xCompressor, NoCompression};

pub use api::{Gbx, GbxOptions};
pub use codec::{Codec, Direction, Field, ReadWrite, TimeInt, TimeSingle};
pub use engine::{HeaderChunk, LoadReport, OpaqueRecord};
pub use error::{GbxError, Result};
pub use external::{ExternalEntry, ExternalFileTable, ExternalTarget, FileLoader, Folder, FsLoader};
pub use format::{Compression, Preamble};
pub use graph::{Chunk, ChunkData, ChunkId, ClassId, Node, NodeHandle, Payload};
pub use ident::{Id, IdName, IdTable, Ident};
pub use inspector::GbxInspector;
pub use reader::{GbxReader, HeaderView};
pub use reference::{ExternalRef, NodeRef};
pub use registry::{ChunkDescriptor, ChunkFlags, ClassDescriptor, ClassRegistry, RegistryBuilder};

// Re-export the derive macro so it is accessible as `gbx::ReadWrite`
pub use gbx_derive::ReadWrite;
