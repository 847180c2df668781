//! The Write-Side Engine.
//!
//! Mirrors the reader section by section. The body is encoded first because the node
//! count written before the reference table depends on the indices handed out while
//! walking the graph. Header chunks are encoded one by one into their own buffers so
//! that their sizes are known when the chunk table is written. A body that encodes to
//! exactly what was loaded is written with the compressed block it was loaded from.

use std::sync::Arc;

use tracing::debug;

use crate::api::Gbx;
use crate::codec::{Codec, Stream};
use crate::engine;
use crate::error::{GbxError, Result};
use crate::format::Compression;
use crate::io::ByteWriter;
use crate::reference::NodeTable;

pub(crate) fn write_container(gbx: &mut Gbx) -> Result<Vec<u8>> {
    let preamble = gbx.header.preamble;
    let registry = Arc::clone(gbx.options.registry());
    let settings = gbx.options.settings();

    if preamble.ref_table_compression == Compression::Compressed {
        return Err(GbxError::format("compressed reference tables are not supported"));
    }
    if !preamble.has_header() && !gbx.header.chunks.is_empty() {
        return Err(GbxError::Format(format!(
            "container version {} has no header chunk table",
            preamble.version
        )));
    }

    let (mut body, nodes) = encode_body(gbx)?;
    let num_nodes = gbx.header.num_nodes.max(nodes.count());
    body.extend_from_slice(&gbx.body_trailing);

    let mut w = ByteWriter::new();
    preamble.write(&mut w);
    if preamble.has_header() {
        let header = engine::write_header_chunks(
            &mut gbx.header.chunks,
            gbx.header.chunk_table,
            preamble.class_id,
            &registry,
            settings,
        )?;
        let size = u32::try_from(header.len())
            .map_err(|_| GbxError::format("header larger than 4 GiB"))?;
        w.write_u32(size);
        w.write_bytes(&header);
    }
    w.write_u32(num_nodes);
    gbx.header.references.write(&mut w, preamble.version)?;

    match preamble.body_compression {
        Compression::Compressed => {
            let packed = match gbx.packed.as_ref().and_then(|p| p.reuse(&body)) {
                Some(block) => block.to_vec(),
                None => gbx.options.body_compressor().compress(&body)?,
            };
            let unpacked_len = u32::try_from(body.len())
                .map_err(|_| GbxError::format("body larger than 4 GiB"))?;
            let packed_len = u32::try_from(packed.len())
                .map_err(|_| GbxError::format("compressed body larger than 4 GiB"))?;
            w.write_u32(unpacked_len);
            w.write_u32(packed_len);
            w.write_bytes(&packed);
        }
        Compression::Uncompressed => w.write_bytes(&body),
    }
    w.write_bytes(&gbx.file_trailing);

    debug!(
        class = %preamble.class_id,
        num_nodes,
        body = body.len(),
        total = w.position(),
        "wrote container"
    );
    Ok(w.into_inner())
}

/// Encodes the root node and everything it references, returning the body bytes and
/// the node table built on the way.
pub(crate) fn encode_body(gbx: &Gbx) -> Result<(Vec<u8>, NodeTable)> {
    let mut codec = Codec::with_stream(
        Stream::Write(ByteWriter::new()),
        Arc::clone(gbx.options.registry()),
        gbx.options.settings(),
    );
    for entry in &gbx.header.references.entries {
        codec.nodes.reserve_external(entry.node_index);
    }
    {
        let mut root = gbx
            .root
            .try_borrow_mut()
            .map_err(|_| GbxError::reference("root node is borrowed elsewhere"))?;
        codec.write_node(&mut root)?;
    }
    let nodes = std::mem::take(&mut codec.nodes);
    Ok((codec.into_bytes()?, nodes))
}
