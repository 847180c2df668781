//! The chunk engine.
//!
//! Reads and writes the ordered chunk sequence of one node. A body chunk record is
//!
//! ```text
//! [chunk id u32] ["PIKS" u32][size u32] [payload]
//!                 ^ skippable chunks only
//! ```
//!
//! and the sequence ends with the `0xFACADE01` sentinel. Only skippable chunks carry
//! their length. Every other chunk is delimited by its handler consuming exactly the
//! fields it declares, so an unknown non-skippable chunk cannot be stepped over and
//! aborts the read.
//!
//! ## Degradation
//!
//! A skippable chunk is bounded. When its handler stops on a version it does not
//! support in lenient mode, the engine keeps the raw bytes as an opaque chunk,
//! records the failure in the [`LoadReport`], and continues with the next sibling.
//! Ids and nodes the handler read before failing stay in the lookback tables, because
//! later chunks may refer back to them. The chunk remembers that growth, and a save
//! replays it after emitting the raw bytes. Malformed data and truncation abort the
//! load in both modes, as does any failure on a non-skippable chunk.
//!
//! ## Deferred chunks
//!
//! Skippable chunks registered with [`ChunkFlags::lazy`](crate::ChunkFlags::lazy)
//! are stored raw during load and decoded by [`Chunk::discover`]. Only handlers
//! whose fields never touch the Id or node tables are deferred (see
//! [`ReadWrite::uses_lookback`](crate::ReadWrite::uses_lookback)); any other lazy
//! chunk is decoded in place so the tables stay in stream order.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::codec::{Codec, Stream};
use crate::error::{GbxError, Result};
use crate::format::{CHUNK_END, HEAVY_BIT, SKIP_MARKER};
use crate::graph::{Chunk, ChunkData, ChunkId, ClassId, DeferredChunk, Node, NodeHandle, Payload};
use crate::io::{ByteReader, ByteWriter};
use crate::registry::{ChunkDescriptor, ClassRegistry};

/// Default bound on node nesting.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Engine behavior switches shared by every codec of one load or save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EngineSettings {
    pub lenient: bool,
    pub discover_lazily: bool,
    pub max_depth: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            lenient: true,
            discover_lazily: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// A chunk that was kept as raw bytes during a load.
#[derive(Debug, Clone)]
pub struct OpaqueRecord {
    /// Class id of the owning node.
    pub class_id: ClassId,
    /// The preserved chunk.
    pub chunk_id: ChunkId,
    /// Offset of the chunk id within its section.
    pub offset: u64,
    /// The version error that stopped the handler, or `None` for chunks without a
    /// registered handler.
    pub error: Option<GbxError>,
}

impl OpaqueRecord {
    /// Returns true if a registered handler failed on this chunk.
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// What a load had to preserve without decoding.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Every chunk stored opaque, in stream order.
    pub opaque: Vec<OpaqueRecord>,
    /// Class ids met in the stream with no registered class.
    pub unknown_classes: Vec<ClassId>,
    /// Number of chunks left deferred for later discovery.
    pub deferred: usize,
}

impl LoadReport {
    /// Returns true if every chunk was decoded by its handler.
    pub fn is_clean(&self) -> bool {
        self.opaque.is_empty() && self.unknown_classes.is_empty()
    }

    /// Chunks whose registered handler failed and that were preserved opaque.
    pub fn degraded(&self) -> impl Iterator<Item = &OpaqueRecord> {
        self.opaque.iter().filter(|r| r.is_degraded())
    }

    pub(crate) fn merge(&mut self, other: LoadReport) {
        self.opaque.extend(other.opaque);
        for class in other.unknown_classes {
            if !self.unknown_classes.contains(&class) {
                self.unknown_classes.push(class);
            }
        }
        self.deferred += other.deferred;
    }

    fn note_unknown_class(&mut self, class_id: ClassId) -> bool {
        if self.unknown_classes.contains(&class_id) {
            return false;
        }
        self.unknown_classes.push(class_id);
        true
    }
}

/// Where a deferred chunk was read, and with which engine.
#[derive(Debug, Clone)]
pub(crate) struct DeferredScope {
    class_id: ClassId,
    offset: usize,
    registry: Arc<ClassRegistry>,
    settings: EngineSettings,
}

/// Lookback growth hidden inside the raw bytes of a degraded chunk.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScopeReplay {
    id_version: Option<u32>,
    ids: Vec<String>,
    nodes: Vec<(u32, NodeHandle)>,
}

impl ScopeReplay {
    pub(crate) fn is_empty(&self) -> bool {
        self.id_version.is_none() && self.ids.is_empty() && self.nodes.is_empty()
    }
}

/// Decodes a deferred chunk with fresh lookback tables.
pub(crate) fn discover(chunk_id: ChunkId, deferred: &DeferredChunk) -> Result<Box<dyn ChunkData>> {
    let scope = &deferred.scope;
    let wrap = |e: GbxError| e.in_chunk(scope.class_id, chunk_id, scope.offset as u64);
    let desc = scope
        .registry
        .resolve_chunk(chunk_id)
        .ok_or_else(|| wrap(GbxError::format("no handler registered for deferred chunk")))?;

    let mut codec = Codec::with_stream(
        Stream::Read(ByteReader::new(&deferred.bytes)),
        Arc::clone(&scope.registry),
        scope.settings,
    );
    codec.base = scope.offset;

    let mut data = desc.instantiate();
    data.read_write(&mut codec).map_err(wrap)?;
    if !codec.at_end() {
        return Err(wrap(GbxError::Format(format!(
            "handler left {} of {} bytes unread",
            codec.rest().len(),
            deferred.bytes.len()
        ))));
    }
    trace!(chunk = %chunk_id, "discovered deferred chunk");
    Ok(data)
}

impl<'a> Codec<'a> {
    /// Instantiates a node of `class_id` and reads its chunk sequence.
    pub(crate) fn read_node(&mut self, class_id: ClassId) -> Result<Node> {
        let mut node = self.registry.instantiate(class_id);
        if self.registry.resolve(class_id).is_none() && self.report.note_unknown_class(class_id) {
            warn!(class = %class_id, "unregistered class, chunks will be kept opaque");
        }
        self.descend(|ctx| ctx.read_chunks(&mut node))?;
        Ok(node)
    }

    /// Writes the chunk sequence of `node`.
    pub(crate) fn write_node(&mut self, node: &mut Node) -> Result<()> {
        self.descend(|ctx| ctx.write_chunks(node))
    }

    fn descend(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        if self.depth >= self.settings.max_depth {
            return Err(GbxError::Format(format!(
                "node nesting exceeds {} levels",
                self.settings.max_depth
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Reads chunks into `node` until the end sentinel.
    pub(crate) fn read_chunks(&mut self, node: &mut Node) -> Result<()> {
        let class_id = node.class_id();
        loop {
            let offset = self.position();
            let r = self.reader_mut()?;
            let raw = r.read_u32()?;
            if raw == CHUNK_END {
                return Ok(());
            }
            let chunk_id = ChunkId::new(raw);
            let handler = self.registry.handler_for(class_id, chunk_id, false).cloned();

            let framed = self.reader_mut()?.peek_u32() == Some(SKIP_MARKER);
            let skippable = match &handler {
                Some(desc) => desc.flags.skippable,
                None => framed,
            };

            let chunk = if skippable {
                self.read_skippable(class_id, chunk_id, offset, handler)?
            } else {
                match handler {
                    Some(desc) => {
                        trace!(class = %class_id, chunk = %chunk_id, offset, "chunk");
                        let mut data = desc.instantiate();
                        data.read_write(self)
                            .map_err(|e| e.in_chunk(class_id, chunk_id, offset as u64))?;
                        Chunk::known(chunk_id, false, data)
                    }
                    None => {
                        return Err(GbxError::format(
                            "unknown chunk without a size prefix cannot be skipped",
                        )
                        .in_chunk(class_id, chunk_id, offset as u64));
                    }
                }
            };
            node.push(chunk);
        }
    }

    fn read_skippable(
        &mut self,
        class_id: ClassId,
        chunk_id: ChunkId,
        offset: usize,
        handler: Option<ChunkDescriptor>,
    ) -> Result<Chunk> {
        let wrap = |e: GbxError| e.in_chunk(class_id, chunk_id, offset as u64);
        let r = self.reader_mut()?;
        let marker = r.read_u32()?;
        if marker != SKIP_MARKER {
            return Err(wrap(GbxError::Format(format!(
                "expected skippable marker, found 0x{marker:08X}"
            ))));
        }
        let size = r.read_u32()? as usize;
        let bytes = r.take_declared(size, "skippable chunk").map_err(wrap)?;
        let payload_start = self.position() - size;

        let Some(desc) = handler else {
            trace!(class = %class_id, chunk = %chunk_id, size, "unregistered skippable chunk");
            self.report.opaque.push(OpaqueRecord {
                class_id,
                chunk_id,
                offset: offset as u64,
                error: None,
            });
            return Ok(Chunk::opaque(chunk_id, true, bytes.to_vec()));
        };

        if desc.defers() && self.settings.discover_lazily {
            trace!(class = %class_id, chunk = %chunk_id, size, "deferred chunk");
            self.report.deferred += 1;
            let scope = DeferredScope {
                class_id,
                offset: payload_start,
                registry: Arc::clone(&self.registry),
                settings: self.settings,
            };
            return Ok(Chunk::deferred(chunk_id, bytes.to_vec(), scope));
        }

        trace!(class = %class_id, chunk = %chunk_id, size, "skippable chunk");
        let ids_len = self.ids.len();
        let had_version = self.ids.version().is_some();
        let node_mark = self.nodes.mark();
        let report_len = self.report.opaque.len();

        let mut data = desc.instantiate();
        let result = self
            .with_sub_reader(bytes, payload_start, |ctx| data.read_write(ctx))
            .and_then(|((), remaining)| {
                if remaining == 0 {
                    Ok(())
                } else {
                    Err(GbxError::Format(format!(
                        "handler left {remaining} of {size} bytes unread"
                    )))
                }
            });

        match result {
            Ok(()) => Ok(Chunk::known(chunk_id, true, data)),
            Err(e) if self.settings.lenient && e.is_version_error() => {
                warn!(class = %class_id, chunk = %chunk_id, offset, error = %e, "chunk kept opaque");
                let replay = ScopeReplay {
                    id_version: self.ids.version().filter(|_| !had_version),
                    ids: self.ids.since(ids_len),
                    nodes: self.nodes.read_since(node_mark),
                };
                self.report.opaque.truncate(report_len);
                self.report.opaque.push(OpaqueRecord {
                    class_id,
                    chunk_id,
                    offset: offset as u64,
                    error: Some(e),
                });
                Ok(Chunk::opaque(chunk_id, true, bytes.to_vec()).with_replay(replay))
            }
            Err(e) => Err(wrap(e)),
        }
    }

    /// Writes the chunks of `node` in order, followed by the end sentinel.
    pub(crate) fn write_chunks(&mut self, node: &mut Node) -> Result<()> {
        let class_id = node.class_id();
        for chunk in node.chunks_mut() {
            let chunk_id = chunk.id();
            let offset = self.position();
            let wrap = |e: GbxError| e.in_chunk(class_id, chunk_id, offset as u64);
            let w = self.writer_mut()?;
            w.write_u32(chunk_id.as_u32());
            if chunk.is_skippable() {
                w.write_u32(SKIP_MARKER);
                let at = w.reserve_u32();
                let start = w.position();
                self.write_payload(chunk).map_err(wrap)?;
                self.writer_mut()?.patch_len_since(at, start)?;
            } else {
                self.write_payload(chunk).map_err(wrap)?;
            }
        }
        self.writer_mut()?.write_u32(CHUNK_END);
        Ok(())
    }

    fn write_payload(&mut self, chunk: &mut Chunk) -> Result<()> {
        match chunk.payload_mut() {
            Payload::Known(data) => data.read_write(self),
            Payload::Deferred(deferred) => {
                self.writer_mut()?.write_bytes(&deferred.bytes);
                Ok(())
            }
            Payload::Opaque(bytes) => {
                self.writer_mut()?.write_bytes(bytes);
                Ok(())
            }
        }?;
        if let Some(replay) = chunk.replay() {
            self.ids.replay(replay.id_version, &replay.ids);
            for (index, handle) in &replay.nodes {
                self.nodes.claim(*index, handle);
            }
        }
        Ok(())
    }
}

/// One entry of the header chunk table.
#[derive(Debug, PartialEq)]
pub struct HeaderChunk {
    /// The decoded or preserved chunk.
    pub chunk: Chunk,
    /// The "heavy" flag stored in the high bit of the size word.
    pub heavy: bool,
}

impl HeaderChunk {
    /// A header chunk with the heavy flag cleared.
    pub fn new(chunk: Chunk) -> Self {
        Self {
            chunk,
            heavy: false,
        }
    }
}

/// Reads the header chunk table: `[count u32] ([id u32][size u32])* [payloads]`.
///
/// Every header chunk is its own Id scope.
pub(crate) fn read_header_chunks(
    data: &[u8],
    base: usize,
    class_id: ClassId,
    registry: &Arc<ClassRegistry>,
    settings: EngineSettings,
    report: &mut LoadReport,
) -> Result<Vec<HeaderChunk>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let mut r = ByteReader::new(data);
    let count = r.read_count("header chunk")?;
    if count.saturating_mul(8) > r.remaining() {
        return Err(GbxError::Format(format!(
            "header declares {count} chunks but only {} bytes remain",
            r.remaining()
        )));
    }

    let mut table = Vec::with_capacity(count);
    for _ in 0..count {
        let id = ChunkId::new(r.read_u32()?);
        let word = r.read_u32()?;
        table.push((id, (word & !HEAVY_BIT) as usize, word & HEAVY_BIT != 0));
    }

    let mut chunks = Vec::with_capacity(count);
    for (chunk_id, size, heavy) in table {
        let offset = base + r.position();
        let bytes = r.take_declared(size, "header chunk")?;
        let chunk = match registry.handler_for(class_id, chunk_id, true) {
            None => {
                trace!(chunk = %chunk_id, size, "unregistered header chunk");
                report.opaque.push(OpaqueRecord {
                    class_id,
                    chunk_id,
                    offset: offset as u64,
                    error: None,
                });
                Chunk::opaque(chunk_id, true, bytes.to_vec())
            }
            Some(desc) => {
                trace!(chunk = %chunk_id, size, "header chunk");
                let mut codec = Codec::with_stream(
                    Stream::Read(ByteReader::new(bytes)),
                    Arc::clone(registry),
                    settings,
                );
                codec.base = offset;
                let mut data = desc.instantiate();
                let result = data.read_write(&mut codec).and_then(|()| {
                    if codec.at_end() {
                        Ok(())
                    } else {
                        Err(GbxError::Format(format!(
                            "handler left {} of {size} bytes unread",
                            codec.rest().len()
                        )))
                    }
                });
                match result {
                    Ok(()) => {
                        report.merge(codec.report);
                        Chunk::known(chunk_id, true, data)
                    }
                    Err(e) if settings.lenient && e.is_version_error() => {
                        warn!(chunk = %chunk_id, offset, error = %e, "header chunk kept opaque");
                        report.opaque.push(OpaqueRecord {
                            class_id,
                            chunk_id,
                            offset: offset as u64,
                            error: Some(e),
                        });
                        Chunk::opaque(chunk_id, true, bytes.to_vec())
                    }
                    Err(e) => return Err(e.in_chunk(class_id, chunk_id, offset as u64)),
                }
            }
        };
        chunks.push(HeaderChunk { chunk, heavy });
    }

    if !r.is_empty() {
        return Err(GbxError::Format(format!(
            "{} bytes left after the last header chunk",
            r.remaining()
        )));
    }
    debug!(count = chunks.len(), "read header chunks");
    Ok(chunks)
}

/// Encodes the header chunk table. Returns an empty buffer when there are no chunks,
/// unless `keep_empty` asks for a table with a zero count.
pub(crate) fn write_header_chunks(
    chunks: &mut [HeaderChunk],
    keep_empty: bool,
    class_id: ClassId,
    registry: &Arc<ClassRegistry>,
    settings: EngineSettings,
) -> Result<Vec<u8>> {
    if chunks.is_empty() && !keep_empty {
        return Ok(Vec::new());
    }
    let mut payloads = Vec::with_capacity(chunks.len());
    for entry in chunks.iter_mut() {
        let chunk_id = entry.chunk.id();
        let mut codec = Codec::with_stream(
            Stream::Write(ByteWriter::new()),
            Arc::clone(registry),
            settings,
        );
        codec
            .write_payload(&mut entry.chunk)
            .map_err(|e| e.in_chunk(class_id, chunk_id, 0))?;
        payloads.push(codec.into_bytes()?);
    }

    let mut w = ByteWriter::new();
    w.write_count(chunks.len(), "header chunk")?;
    for (entry, payload) in chunks.iter().zip(&payloads) {
        let size = u32::try_from(payload.len())
            .ok()
            .filter(|size| size & HEAVY_BIT == 0)
            .ok_or_else(|| GbxError::format("header chunk larger than 2 GiB"))?;
        w.write_u32(entry.chunk.id().as_u32());
        w.write_u32(if entry.heavy { size | HEAVY_BIT } else { size });
    }
    for payload in &payloads {
        w.write_bytes(payload);
    }
    Ok(w.into_inner())
}
