//! Pluggable body compression.
//!
//! The container body is compressed as one block and decompressed into memory before
//! any chunk parsing starts. The algorithm itself is an external collaborator, so the
//! engine only talks to the [`Compressor`] trait. Three implementations ship with the
//! crate:
//!
//! *   [`Lzo1xCompressor`]: LZO1X, the codec game files use. This is the default.
//! *   [`NoCompression`]: pass-through, always available.
//! *   [`Lz4Compressor`]: LZ4 block format (feature `lz4_flex`). Only for containers
//!     this crate wrote itself with the same setting, since the game cannot read them.
//!
//! Other codecs plug in through
//! [`GbxOptions::compressor`](crate::GbxOptions::compressor).
//!
//! A loaded container keeps its compressed block, and a save reuses it as long as the
//! body encodes to the same bytes, so files packed by another LZO1X encoder survive
//! an unmodified round trip.

mod lzo;

use std::fmt;
use std::sync::Arc;

use twox_hash::XxHash64;

use crate::error::{GbxError, Result};

/// Interface for body compression algorithms.
///
/// The wire format stores both the uncompressed and the compressed size next to the
/// compressed block, so `decompress` always knows the exact output length.
pub trait Compressor: Send + Sync + fmt::Debug {
    /// Human-readable algorithm name used in logs and inspector reports.
    fn name(&self) -> &'static str;

    /// Compresses a whole body.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompresses a whole body into exactly `uncompressed_len` bytes.
    fn decompress(&self, data: &[u8], uncompressed_len: usize) -> Result<Vec<u8>>;
}

/// A compressor that stores the body unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn name(&self) -> &'static str {
        "None"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        if data.len() != uncompressed_len {
            return Err(GbxError::Compression(format!(
                "pass-through body is {} bytes, header announces {uncompressed_len}",
                data.len()
            )));
        }
        Ok(data.to_vec())
    }
}

/// A compressor using the LZO1X block format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lzo1xCompressor;

impl Compressor for Lzo1xCompressor {
    fn name(&self) -> &'static str {
        "LZO1X"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(lzo::compress(data))
    }

    fn decompress(&self, data: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        lzo::decompress(data, uncompressed_len)
    }
}

#[cfg(feature = "lz4_flex")]
/// A compressor using the LZ4 block format.
///
/// The uncompressed size is not prepended to the block, since the container already
/// stores it in the body framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Compressor;

#[cfg(feature = "lz4_flex")]
impl Compressor for Lz4Compressor {
    fn name(&self) -> &'static str {
        "LZ4"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::block::compress(data))
    }

    fn decompress(&self, data: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        let out = lz4_flex::block::decompress(data, uncompressed_len)
            .map_err(|e| GbxError::Compression(e.to_string()))?;
        if out.len() != uncompressed_len {
            return Err(GbxError::Compression(format!(
                "LZ4 body inflated to {} bytes, header announces {uncompressed_len}",
                out.len()
            )));
        }
        Ok(out)
    }
}

/// A compressed body block as loaded, with a digest of what it inflates to.
#[derive(Clone)]
pub(crate) struct PackedBody {
    digest: u64,
    len: usize,
    data: Vec<u8>,
}

impl PackedBody {
    pub(crate) fn new(body: &[u8], data: Vec<u8>) -> Self {
        Self {
            digest: XxHash64::oneshot(0, body),
            len: body.len(),
            data,
        }
    }

    /// The stored block, if `body` is what it inflates to.
    pub(crate) fn reuse(&self, body: &[u8]) -> Option<&[u8]> {
        (body.len() == self.len && XxHash64::oneshot(0, body) == self.digest)
            .then_some(self.data.as_slice())
    }
}

impl fmt::Debug for PackedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackedBody({} -> {} bytes)", self.data.len(), self.len)
    }
}

/// The compressor used when none is configured.
pub fn default_compressor() -> Arc<dyn Compressor> {
    Arc::new(Lzo1xCompressor)
}
