//! Centralized error handling for the GBX engine.
//!
//! Every fallible operation in the crate returns [`Result`], and library code never
//! panics on malformed input. The [`GbxError`] variants follow the failure domains of
//! the container format:
//!
//! - **I/O Errors** ([`GbxError::Io`]): truncated input and file system failures
//! - **Format Errors** ([`GbxError::Format`]): bad magic, negative or oversized lengths,
//!   unknown non-skippable chunks, bad sentinels
//! - **Version Errors** ([`GbxError::UnsupportedVersion`], [`GbxError::UnseenVersion`]):
//!   a chunk handler met a version it cannot decode
//! - **Reference Errors** ([`GbxError::Reference`]): dangling back-references, Id indices
//!   outside their table, unresolvable external files
//! - **Compression Errors** ([`GbxError::Compression`]): body codec failures
//!
//! Errors raised inside a chunk handler are wrapped in [`GbxError::Chunk`] by the chunk
//! engine, so a strict-mode failure always reports the chunk id, the owning node's class
//! id, and the byte offset where the chunk started.
//!
//! ## Usage
//!
//! ```rust
//! use gbx::{ClassRegistry, GbxError, GbxOptions};
//!
//! let registry = ClassRegistry::builder().build();
//! match GbxOptions::new(registry).load(b"not a gbx file") {
//!     Err(GbxError::Format(msg)) => println!("rejected: {msg}"),
//!     Err(e) => println!("other failure: {e}"),
//!     Ok(_) => unreachable!(),
//! }
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

use crate::graph::{ChunkId, ClassId};

/// A specialized `Result` type for GBX operations.
pub type Result<T> = std::result::Result<T, GbxError>;

/// The master error enum covering all failure domains of the engine.
///
/// This type is `Clone` so that lenient-mode reads can keep the error that caused a
/// chunk to be preserved opaque inside the [`LoadReport`](crate::LoadReport). I/O
/// errors are wrapped in `Arc` to make cloning cheap.
#[derive(Debug, Clone)]
pub enum GbxError {
    /// Low-level I/O failure, including input that ends in the middle of a primitive.
    Io(Arc<io::Error>),

    /// The byte stream does not follow the container format.
    ///
    /// Raised for wrong magic bytes, negative counts, lengths that point past the end
    /// of the stream, unknown non-skippable chunks, or a handler that did not consume
    /// its chunk payload exactly.
    Format(String),

    /// A chunk declares a version that is known to be retired.
    UnsupportedVersion {
        /// The version value read from the stream.
        version: i32,
        /// The oldest version the handler still decodes.
        min: i32,
    },

    /// A chunk declares a version above anything the handler was validated against.
    ///
    /// This usually means the schema catalog needs updating rather than that the file
    /// is corrupted.
    UnseenVersion {
        /// The version value read from the stream.
        version: i32,
        /// The newest version the handler decodes.
        max: i32,
    },

    /// A node or Id reference could not be resolved.
    Reference(String),

    /// The body compressor failed.
    Compression(String),

    /// An error raised while processing a specific chunk.
    Chunk {
        /// Class id of the node owning the chunk.
        class_id: ClassId,
        /// Id of the failing chunk.
        chunk_id: ChunkId,
        /// Byte offset of the chunk id within the section being decoded.
        offset: u64,
        /// The underlying failure.
        source: Box<GbxError>,
    },
}

impl GbxError {
    /// Convenience constructor for [`GbxError::Format`].
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Convenience constructor for [`GbxError::Reference`].
    pub fn reference(msg: impl Into<String>) -> Self {
        Self::Reference(msg.into())
    }

    /// Wraps `self` with the location of the chunk that raised it.
    pub fn in_chunk(self, class_id: ClassId, chunk_id: ChunkId, offset: u64) -> Self {
        Self::Chunk {
            class_id,
            chunk_id,
            offset,
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping every [`GbxError::Chunk`] wrapper.
    pub fn root_cause(&self) -> &GbxError {
        let mut current = self;
        while let Self::Chunk { source, .. } = current {
            current = source;
        }
        current
    }

    /// Returns true if the root cause is a chunk version error.
    pub fn is_version_error(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::UnsupportedVersion { .. } | Self::UnseenVersion { .. }
        )
    }

    /// Returns true for input that ended in the middle of a value.
    pub(crate) fn is_eof(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }

    pub(crate) fn eof(what: &str) -> Self {
        Self::Io(Arc::new(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("stream ended while reading {what}"),
        )))
    }
}

impl fmt::Display for GbxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O Error: {e}"),
            Self::Format(s) => write!(f, "Format Error: {s}"),
            Self::UnsupportedVersion { version, min } => {
                write!(f, "Unsupported chunk version {version} (oldest supported: {min})")
            }
            Self::UnseenVersion { version, max } => {
                write!(f, "Unseen chunk version {version} (newest known: {max})")
            }
            Self::Reference(s) => write!(f, "Reference Error: {s}"),
            Self::Compression(s) => write!(f, "Compression Error: {s}"),
            Self::Chunk {
                class_id,
                chunk_id,
                offset,
                source,
            } => write!(
                f,
                "chunk {chunk_id} of class {class_id} at offset {offset}: {source}"
            ),
        }
    }
}

impl std::error::Error for GbxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Chunk { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for GbxError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
