//! The Read-Side Engine.
//!
//! Parses a container in two steps over one cursor. [`GbxReader::read_header`] stops
//! right before the body, which is all bulk indexing needs. [`GbxReader::read_body`]
//! continues from that position, decompresses the body into memory, and only then
//! hands it to the chunk engine: chunk parsing never interleaves with decompression.

use std::borrow::Cow;
use std::sync::Arc;

use tracing::debug;

use crate::api::{Gbx, GbxOptions};
use crate::codec::{Codec, Stream};
use crate::compression::PackedBody;
use crate::engine::{self, HeaderChunk, LoadReport};
use crate::error::{GbxError, Result};
use crate::external::ExternalFileTable;
use crate::format::{Compression, Preamble};
use crate::graph::{ChunkData, ClassId};
use crate::io::ByteReader;

/// Everything that precedes the body.
#[derive(Debug)]
pub struct HeaderView {
    pub(crate) preamble: Preamble,
    pub(crate) chunks: Vec<HeaderChunk>,
    pub(crate) chunk_table: bool,
    pub(crate) num_nodes: u32,
    pub(crate) references: ExternalFileTable,
    pub(crate) report: LoadReport,
}

impl HeaderView {
    pub(crate) fn new(preamble: Preamble) -> Self {
        Self {
            preamble,
            chunks: Vec::new(),
            chunk_table: false,
            num_nodes: 0,
            references: ExternalFileTable::default(),
            report: LoadReport::default(),
        }
    }

    /// The fixed-layout preamble.
    pub fn preamble(&self) -> &Preamble {
        &self.preamble
    }

    /// Class id of the root node.
    pub fn class_id(&self) -> ClassId {
        self.preamble.class_id
    }

    /// Container version.
    pub fn version(&self) -> u16 {
        self.preamble.version
    }

    /// Header chunks in stream order.
    pub fn chunks(&self) -> &[HeaderChunk] {
        &self.chunks
    }

    /// Whether the header carried a chunk table, even one with no entries.
    pub fn has_chunk_table(&self) -> bool {
        self.chunk_table || !self.chunks.is_empty()
    }

    /// Returns the first decoded header chunk of type `T`.
    pub fn get<T: ChunkData>(&self) -> Option<&T> {
        self.chunks.iter().find_map(|h| h.chunk.data::<T>())
    }

    /// The node count declared by the container.
    pub fn num_nodes(&self) -> u32 {
        self.num_nodes
    }

    /// The external file table.
    pub fn references(&self) -> &ExternalFileTable {
        &self.references
    }

    /// Chunks the header parse kept opaque.
    pub fn report(&self) -> &LoadReport {
        &self.report
    }
}

/// A cursor over one container.
#[derive(Debug)]
pub struct GbxReader<'a> {
    r: ByteReader<'a>,
    options: GbxOptions,
}

impl<'a> GbxReader<'a> {
    /// Starts reading `data` with the given options.
    pub fn new(data: &'a [u8], options: GbxOptions) -> Self {
        Self {
            r: ByteReader::new(data),
            options,
        }
    }

    /// Parses the preamble, header chunks and reference table.
    pub fn read_header(&mut self) -> Result<HeaderView> {
        let preamble = Preamble::read(&mut self.r)?;
        debug!(
            version = preamble.version,
            class = %preamble.class_id,
            body = ?preamble.body_compression,
            "read preamble"
        );
        if preamble.ref_table_compression == Compression::Compressed {
            return Err(GbxError::format("compressed reference tables are not supported"));
        }

        let mut header = HeaderView::new(preamble);
        if preamble.has_header() {
            let size = self.r.read_u32()? as usize;
            let start = self.r.position();
            let data = self.r.take_declared(size, "header")?;
            header.chunk_table = size > 0;
            header.chunks = engine::read_header_chunks(
                data,
                start,
                preamble.class_id,
                self.options.registry(),
                self.options.settings(),
                &mut header.report,
            )?;
        }

        header.num_nodes = self.r.read_u32()?;
        header.references = ExternalFileTable::read(&mut self.r, preamble.version)?;
        debug!(
            num_nodes = header.num_nodes,
            externals = header.references.entries.len(),
            "read reference table"
        );
        Ok(header)
    }

    /// Decodes the body that follows `header` and assembles the graph.
    pub fn read_body(&mut self, mut header: HeaderView) -> Result<Gbx> {
        let mut packed = None;
        let (body, trailing): (Cow<'a, [u8]>, Vec<u8>) = match header.preamble.body_compression {
            Compression::Compressed => {
                let uncompressed = self.r.read_u32()? as usize;
                let compressed = self.r.read_u32()? as usize;
                let data = self.r.take_declared(compressed, "compressed body")?;
                let body = self.options.body_compressor().decompress(data, uncompressed)?;
                debug!(
                    compressed,
                    uncompressed,
                    codec = self.options.body_compressor().name(),
                    "decompressed body"
                );
                let trailing = self.r.rest().to_vec();
                packed = Some(PackedBody::new(&body, data.to_vec()));
                (Cow::Owned(body), trailing)
            }
            Compression::Uncompressed => (Cow::Borrowed(self.r.rest()), Vec::new()),
        };
        self.r.take(self.r.remaining())?;

        let mut codec = Codec::with_stream(
            Stream::Read(ByteReader::new(&body)),
            Arc::clone(self.options.registry()),
            self.options.settings(),
        );
        codec.nodes.set_limit(header.num_nodes);
        for entry in &header.references.entries {
            codec.nodes.reserve_external(entry.node_index);
        }

        let root = codec.read_node(header.preamble.class_id)?;
        let body_trailing = codec.rest().to_vec();
        debug!(
            nodes = codec.nodes.len(),
            opaque = codec.report.opaque.len(),
            trailing = body_trailing.len() + trailing.len(),
            "read body"
        );
        header.report.merge(codec.report);

        let mut gbx = Gbx::from_parts(
            header,
            root.into_handle(),
            body_trailing,
            trailing,
            self.options.clone(),
        );
        gbx.packed = packed;
        Ok(gbx)
    }
}
