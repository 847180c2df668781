//! Defines the physical binary layout of GBX files.
//!
//! # Layout
//! A container is a fixed preamble, a header chunk table, the reference table and the
//! body, all little-endian:
//!
//! ```text
//! "GBX" | version u16
//!       | [v>=3] format 'B' | ref table compression | body compression
//!       | [v>=4] one reserved byte
//!       | class id u32
//!       | [v>=6] user data size u32 | header chunks
//!       | num nodes u32
//!       | reference table
//!       | body: [uncompressed size u32 | compressed size u32] data
//! ```
//!
//! Compression bytes are `'U'` (uncompressed) or `'C'` (compressed). An uncompressed
//! body runs to the end of the file.

use serde::Serialize;

use crate::error::{GbxError, Result};
use crate::graph::ClassId;
use crate::io::{ByteReader, ByteWriter};

/// Magic bytes identifying the file format.
pub const MAGIC_BYTES: [u8; 3] = *b"GBX";

/// Oldest container version this crate reads.
pub const MIN_VERSION: u16 = 3;

/// Newest container version this crate reads.
pub const MAX_VERSION: u16 = 6;

/// Terminates every chunk sequence.
pub const CHUNK_END: u32 = 0xFACA_DE01;

/// "PIKS": announces the size word of a skippable chunk.
pub const SKIP_MARKER: u32 = 0x534B_4950;

/// High bit of a header chunk size word.
pub const HEAVY_BIT: u32 = 0x8000_0000;

const FORMAT_BINARY: u8 = b'B';

/// Compression state of a container section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Compression {
    /// Stored as is (`'U'`).
    Uncompressed,
    /// Stored through the body compressor (`'C'`).
    Compressed,
}

impl Compression {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            b'U' => Ok(Self::Uncompressed),
            b'C' => Ok(Self::Compressed),
            other => Err(GbxError::Format(format!(
                "unknown compression marker 0x{other:02X}"
            ))),
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            Self::Uncompressed => b'U',
            Self::Compressed => b'C',
        }
    }
}

/// The fixed-layout start of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Preamble {
    /// Container version.
    pub version: u16,
    /// Compression of the reference table.
    pub ref_table_compression: Compression,
    /// Compression of the body.
    pub body_compression: Compression,
    /// The reserved byte of version 4 and later, kept for round-trips.
    pub reserved: u8,
    /// Class id of the root node.
    pub class_id: ClassId,
}

impl Preamble {
    /// A version 6 preamble with a compressed body, as written by current engines.
    pub fn new(class_id: ClassId) -> Self {
        Self {
            version: MAX_VERSION,
            ref_table_compression: Compression::Uncompressed,
            body_compression: Compression::Compressed,
            reserved: b'R',
            class_id,
        }
    }

    /// Whether the version carries a header chunk table.
    pub fn has_header(&self) -> bool {
        self.version >= 6
    }

    /// Parses and validates the preamble.
    pub fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        let magic = r
            .take(MAGIC_BYTES.len())
            .map_err(|_| GbxError::format("file too short for magic bytes"))?;
        if magic != MAGIC_BYTES {
            return Err(GbxError::format("invalid magic bytes"));
        }

        let version = r.read_u16()?;
        if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
            return Err(GbxError::Format(format!(
                "unsupported container version {version}"
            )));
        }

        let format = r.read_u8()?;
        if format != FORMAT_BINARY {
            return Err(GbxError::Format(format!(
                "only binary containers are supported, found format 0x{format:02X}"
            )));
        }
        let ref_table_compression = Compression::from_byte(r.read_u8()?)?;
        let body_compression = Compression::from_byte(r.read_u8()?)?;
        let reserved = if version >= 4 { r.read_u8()? } else { 0 };
        let class_id = ClassId::new(r.read_u32()?);

        Ok(Self {
            version,
            ref_table_compression,
            body_compression,
            reserved,
            class_id,
        })
    }

    /// Serializes the preamble.
    pub fn write(&self, w: &mut ByteWriter) {
        w.write_bytes(&MAGIC_BYTES);
        w.write_u16(self.version);
        w.write_u8(FORMAT_BINARY);
        w.write_u8(self.ref_table_compression.as_byte());
        w.write_u8(self.body_compression.as_byte());
        if self.version >= 4 {
            w.write_u8(self.reserved);
        }
        w.write_u32(self.class_id.as_u32());
    }
}
